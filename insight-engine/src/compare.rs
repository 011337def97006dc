// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Side-by-side comparison of two session sets.
//!
//! Typical uses: two versions of the system under test, two branches, or
//! two time windows. A test is judged by its latest final outcome on each
//! side, so a flaky test that recovered counts as passing.

use crate::{errors::CompareError, helpers, stats};
use insight_model::{NodeId, TestOutcome, TestSession};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two session sets staged for comparison.
#[derive(Clone, Debug, Default)]
pub struct Comparison {
    base: Vec<TestSession>,
    target: Vec<TestSession>,
}

impl Comparison {
    /// Stages a base (before) and target (after) set.
    pub fn new(base: Vec<TestSession>, target: Vec<TestSession>) -> Self {
        Self { base, target }
    }

    /// Partitions one session list by SUT name and compares the two parts.
    ///
    /// Sessions for other SUTs are ignored.
    pub fn compare_suts(
        sessions: &[TestSession],
        base_sut: &str,
        target_sut: &str,
    ) -> Result<ComparisonReport, CompareError> {
        let side = |sut: &str| {
            sessions
                .iter()
                .filter(|session| session.sut_name() == sut)
                .cloned()
                .collect()
        };
        Self::new(side(base_sut), side(target_sut)).compare()
    }

    /// Compares the two sides.
    ///
    /// With one side empty the report carries that side's (zeroed) summary
    /// with zero deltas and empty diff lists; with both sides empty this
    /// fails with [`CompareError::NoSessions`].
    pub fn compare(&self) -> Result<ComparisonReport, CompareError> {
        if self.base.is_empty() && self.target.is_empty() {
            return Err(CompareError::NoSessions);
        }

        let base = side_summary(&self.base);
        let target = side_summary(&self.target);

        let (pass_rate_delta, average_duration_delta_secs, new_failures, new_passes) =
            if self.base.is_empty() || self.target.is_empty() {
                (0.0, 0.0, Vec::new(), Vec::new())
            } else {
                let base_verdicts = latest_final_outcomes(&self.base);
                let target_verdicts = latest_final_outcomes(&self.target);

                let mut new_failures = Vec::new();
                let mut new_passes = Vec::new();
                for (nodeid, base_outcome) in &base_verdicts {
                    let Some(target_outcome) = target_verdicts.get(nodeid) else {
                        continue;
                    };
                    if *base_outcome == TestOutcome::Passed && target_outcome.is_failed() {
                        new_failures.push(nodeid.clone());
                    } else if base_outcome.is_failed() && *target_outcome == TestOutcome::Passed {
                        new_passes.push(nodeid.clone());
                    }
                }

                (
                    target.pass_rate - base.pass_rate,
                    target.average_duration_secs - base.average_duration_secs,
                    new_failures,
                    new_passes,
                )
            };

        Ok(ComparisonReport {
            base,
            target,
            pass_rate_delta,
            average_duration_delta_secs,
            new_failures,
            new_passes,
        })
    }
}

/// Each test's final outcome in the side's most recent session containing
/// it.
fn latest_final_outcomes(sessions: &[TestSession]) -> BTreeMap<NodeId, TestOutcome> {
    let mut verdicts = BTreeMap::new();
    for session in helpers::sorted_by_start_time(sessions) {
        verdicts.extend(session.final_outcomes());
    }
    verdicts
}

fn side_summary(sessions: &[TestSession]) -> SideSummary {
    let counts = helpers::aggregate_counts(sessions);
    let durations: Vec<f64> = sessions
        .iter()
        .flat_map(|session| session.test_results())
        .filter(|result| result.outcome() != TestOutcome::Rerun)
        .map(|result| result.duration().as_secs_f64())
        .collect();

    SideSummary {
        sessions: sessions.len(),
        tests: counts.total(),
        pass_rate: counts.pass_rate(),
        average_duration_secs: stats::mean(&durations),
    }
}

/// What changed between the two sides.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ComparisonReport {
    /// The base side's aggregates.
    pub base: SideSummary,

    /// The target side's aggregates.
    pub target: SideSummary,

    /// Target pass rate minus base pass rate; 0 when a side is empty.
    pub pass_rate_delta: f64,

    /// Target mean test duration minus base, in seconds; 0 when a side is
    /// empty.
    pub average_duration_delta_secs: f64,

    /// Tests passing in base but failing in target, sorted by nodeid.
    pub new_failures: Vec<NodeId>,

    /// Tests failing in base but passing in target, sorted by nodeid.
    pub new_passes: Vec<NodeId>,
}

/// Aggregates for one side of a comparison.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SideSummary {
    /// Sessions on this side.
    pub sessions: usize,

    /// Results of record on this side, excluding rerun attempts.
    pub tests: usize,

    /// Share of results of record that passed.
    pub pass_rate: f64,

    /// Mean duration of results of record, in seconds.
    pub average_duration_secs: f64,
}
