// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for walking session history.

use chrono::NaiveDate;
use insight_model::{NodeId, OutcomeCounts, TestOutcome, TestSession};
use std::collections::BTreeMap;
use std::time::Duration;

/// Returns references to the sessions ordered by start time.
///
/// Ties keep the input order, so repeated calls over the same slice produce
/// the same chronology.
pub(crate) fn sorted_by_start_time(sessions: &[TestSession]) -> Vec<&TestSession> {
    let mut sorted: Vec<&TestSession> = sessions.iter().collect();
    sorted.sort_by_key(|session| session.session_start_time());
    sorted
}

/// The calendar date a session started on, in the session's own offset.
pub(crate) fn session_date(session: &TestSession) -> NaiveDate {
    session.session_start_time().date_naive()
}

/// Tallies outcomes across all sessions.
pub(crate) fn aggregate_counts(sessions: &[TestSession]) -> OutcomeCounts {
    OutcomeCounts::from_outcomes(
        sessions
            .iter()
            .flat_map(|session| session.test_results())
            .map(|result| result.outcome()),
    )
}

/// The final outcome of every test in every session, in chronological
/// session order.
///
/// Each test maps to the sequence of its final outcomes across the sessions
/// that ran it. This is the series that streak detection, stability scoring,
/// and failure prediction all walk.
pub(crate) fn final_outcome_series(sessions: &[TestSession]) -> BTreeMap<NodeId, Vec<TestOutcome>> {
    let mut series: BTreeMap<NodeId, Vec<TestOutcome>> = BTreeMap::new();
    for session in sorted_by_start_time(sessions) {
        for (nodeid, outcome) in session.final_outcomes() {
            series.entry(nodeid).or_default().push(outcome);
        }
    }
    series
}

/// Sums a duration iterator into fractional seconds.
pub(crate) fn total_secs(durations: impl IntoIterator<Item = Duration>) -> f64 {
    durations
        .into_iter()
        .map(|duration| duration.as_secs_f64())
        .sum()
}
