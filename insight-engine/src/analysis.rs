// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate computations over a set of recorded sessions.
//!
//! [`Analysis`] owns a snapshot of sessions and answers suite-level
//! questions: totals, pass rate, slow and failing tests, failure streaks,
//! and health comparisons. Every computation treats an empty snapshot as a
//! zeroed result rather than an error; the only fallible operations are
//! loading ([`Analysis::from_store`]), scoping
//! ([`Analysis::with_query`]), and comparing two empty sides
//! ([`Analysis::compare_health`]).

use crate::{
    errors::{AnalysisError, QueryBuildError, StoreError},
    helpers,
    insights::composite_health_score,
    query::Query,
    stats,
    store::SessionStore,
};
use insight_model::{NodeId, TestOutcome, TestSession};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

/// How many tests the prebuilt reports list.
const REPORT_LIMIT: usize = 10;

/// Aggregate analysis over an owned snapshot of sessions.
#[derive(Clone, Debug, Default)]
pub struct Analysis {
    sessions: Vec<TestSession>,
}

impl Analysis {
    /// Wraps a snapshot of sessions.
    pub fn new(sessions: Vec<TestSession>) -> Self {
        Self { sessions }
    }

    /// Loads every stored session into a new analysis.
    pub fn from_store(store: &dyn SessionStore) -> Result<Self, StoreError> {
        Ok(Self::new(store.load_sessions()?))
    }

    /// The sessions in scope.
    pub fn sessions(&self) -> &[TestSession] {
        &self.sessions
    }

    /// Returns a new analysis scoped to the sessions admitted by a query.
    ///
    /// ```
    /// # use insight_engine::analysis::Analysis;
    /// # fn example(analysis: &Analysis) -> Result<(), insight_engine::errors::QueryBuildError> {
    /// let staging = analysis.with_query(|query| query.with_tag("environment", "staging"))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_query<F>(&self, build: F) -> Result<Analysis, QueryBuildError>
    where
        F: FnOnce(Query) -> Query,
    {
        let result = build(Query::new()).execute(&self.sessions)?;
        Ok(Analysis::new(result.into_sessions()))
    }

    /// Counts results of record across all sessions, excluding rerun
    /// attempts.
    pub fn count_total_tests(&self) -> usize {
        helpers::aggregate_counts(&self.sessions).total()
    }

    /// The share of results of record that passed, 0.0 when there are
    /// none.
    pub fn calculate_pass_rate(&self) -> f64 {
        helpers::aggregate_counts(&self.sessions).pass_rate()
    }

    /// Mean duration of results of record, zero when there are none.
    pub fn calculate_average_duration(&self) -> Duration {
        let mut total = 0.0;
        let mut count = 0usize;
        for result in self
            .sessions
            .iter()
            .flat_map(|session| session.test_results())
            .filter(|result| result.outcome() != TestOutcome::Rerun)
        {
            total += result.duration().as_secs_f64();
            count += 1;
        }
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(total / count as f64)
        }
    }

    /// Tests that needed reruns to pass in at least one session, sorted by
    /// nodeid.
    pub fn identify_flaky_tests(&self) -> Vec<NodeId> {
        self.sessions
            .iter()
            .flat_map(|session| session.rerun_test_groups())
            .filter(|group| group.is_recovered())
            .map(|group| group.nodeid().clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Tests ranked by total recorded duration, rerun attempts included.
    pub fn identify_slowest_tests(&self, limit: usize) -> Vec<(NodeId, Duration)> {
        let mut totals: BTreeMap<&NodeId, Duration> = BTreeMap::new();
        for result in self
            .sessions
            .iter()
            .flat_map(|session| session.test_results())
        {
            *totals.entry(result.nodeid()).or_insert(Duration::ZERO) += result.duration();
        }
        totals
            .into_iter()
            .map(|(nodeid, total)| (nodeid.clone(), total))
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .take(limit)
            .collect()
    }

    /// Tests ranked by how many results of record failed.
    ///
    /// Tests that never failed are omitted.
    pub fn identify_most_failing_tests(&self, limit: usize) -> Vec<(NodeId, usize)> {
        let mut counts: BTreeMap<&NodeId, usize> = BTreeMap::new();
        for result in self
            .sessions
            .iter()
            .flat_map(|session| session.test_results())
            .filter(|result| result.outcome().is_failed())
        {
            *counts.entry(result.nodeid()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(nodeid, count)| (nodeid.clone(), count))
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .take(limit)
            .collect()
    }

    /// Tests whose final outcomes failed in at least
    /// `min_consecutive_failures` consecutive sessions.
    ///
    /// Sessions are ordered chronologically and a failure means
    /// [`TestOutcome::is_failed`]. A zero minimum is treated as 1.
    pub fn identify_consistently_failing_tests(
        &self,
        min_consecutive_failures: usize,
    ) -> Vec<NodeId> {
        let min_consecutive = min_consecutive_failures.max(1);
        helpers::final_outcome_series(&self.sessions)
            .into_iter()
            .filter(|(_, outcomes)| max_failure_streak(outcomes) >= min_consecutive)
            .map(|(nodeid, _)| nodeid)
            .collect()
    }

    /// Like [`identify_consistently_failing_tests`], but a streak
    /// tolerates interspersed passes within bounds.
    ///
    /// A non-failure keeps a streak alive while, over the streak so far,
    /// the pass ratio stays at or below `hysteresis_threshold` and the
    /// failure rate stays at or above `min_failure_rate`; otherwise the
    /// streak resets. Both rates are clamped to `[0, 1]`, and a failure
    /// never resets a streak, so the result is always a superset of the
    /// strict variant for the same minimum.
    ///
    /// [`identify_consistently_failing_tests`]: Self::identify_consistently_failing_tests
    pub fn identify_consistently_failing_tests_with_hysteresis(
        &self,
        min_consecutive_failures: usize,
        hysteresis_threshold: f64,
        min_failure_rate: f64,
    ) -> Vec<NodeId> {
        let min_consecutive = min_consecutive_failures.max(1);
        let hysteresis_threshold = hysteresis_threshold.clamp(0.0, 1.0);
        let min_failure_rate = min_failure_rate.clamp(0.0, 1.0);
        helpers::final_outcome_series(&self.sessions)
            .into_iter()
            .filter(|(_, outcomes)| {
                hysteresis_streak_reaches(
                    outcomes,
                    min_consecutive,
                    hysteresis_threshold,
                    min_failure_rate,
                )
            })
            .map(|(nodeid, _)| nodeid)
            .collect()
    }

    /// Compares the composite health score of two session sets.
    ///
    /// Either side may be given explicitly; a missing side defaults to the
    /// corresponding half of this analysis's sessions split
    /// chronologically down the middle (earlier half = base). Fails with
    /// [`AnalysisError::NoSessions`] only when both sides end up empty.
    pub fn compare_health(
        &self,
        base: Option<&[TestSession]>,
        target: Option<&[TestSession]>,
    ) -> Result<HealthComparison, AnalysisError> {
        let halves;
        let (base, target) = match (base, target) {
            (Some(base), Some(target)) => (base, target),
            (base, target) => {
                halves = self.bisect();
                (
                    base.unwrap_or(&halves.0),
                    target.unwrap_or(&halves.1),
                )
            }
        };
        if base.is_empty() && target.is_empty() {
            return Err(AnalysisError::NoSessions);
        }

        let base_health = composite_health_score(base);
        let target_health = composite_health_score(target);
        let health_difference = target_health - base_health;
        Ok(HealthComparison {
            base_health,
            target_health,
            health_difference,
            improved: health_difference > 0.0,
        })
    }

    /// Splits the snapshot chronologically into (earlier, later) halves.
    fn bisect(&self) -> (Vec<TestSession>, Vec<TestSession>) {
        let sorted = helpers::sorted_by_start_time(&self.sessions);
        let mid = sorted.len() / 2;
        (
            sorted[..mid].iter().map(|&session| session.clone()).collect(),
            sorted[mid..].iter().map(|&session| session.clone()).collect(),
        )
    }

    /// A one-stop health summary.
    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            total_sessions: self.sessions.len(),
            total_tests: self.count_total_tests(),
            pass_rate: self.calculate_pass_rate(),
            health_score: composite_health_score(&self.sessions),
            flaky_tests: self.identify_flaky_tests(),
            consistently_failing_tests: self.identify_consistently_failing_tests(3),
        }
    }

    /// A one-stop rerun and failure summary.
    pub fn stability_report(&self) -> StabilityReport {
        let total_rerun_groups: usize = self
            .sessions
            .iter()
            .map(|session| session.rerun_test_groups().len())
            .sum();
        let recovered_rerun_groups = self
            .sessions
            .iter()
            .flat_map(|session| session.rerun_test_groups())
            .filter(|group| group.is_recovered())
            .count();
        let rerun_recovery_rate = if total_rerun_groups == 0 {
            100.0
        } else {
            100.0 * recovered_rerun_groups as f64 / total_rerun_groups as f64
        };

        StabilityReport {
            total_rerun_groups,
            recovered_rerun_groups,
            rerun_recovery_rate,
            flaky_tests: self.identify_flaky_tests(),
            most_failing_tests: self
                .identify_most_failing_tests(REPORT_LIMIT)
                .into_iter()
                .map(|(nodeid, failures)| TestFailureCount { nodeid, failures })
                .collect(),
        }
    }

    /// A one-stop timing summary.
    pub fn performance_report(&self) -> PerformanceReport {
        let session_durations: Vec<f64> = self
            .sessions
            .iter()
            .map(|session| session.session_duration().as_secs_f64())
            .collect();

        PerformanceReport {
            total_sessions: self.sessions.len(),
            average_test_duration_secs: self.calculate_average_duration().as_secs_f64(),
            average_session_duration_secs: stats::mean(&session_durations),
            slowest_tests: self
                .identify_slowest_tests(REPORT_LIMIT)
                .into_iter()
                .map(|(nodeid, total)| TestDurationTotal {
                    nodeid,
                    total_secs: total.as_secs_f64(),
                })
                .collect(),
        }
    }
}

/// Longest run of consecutive failed final outcomes.
fn max_failure_streak(outcomes: &[TestOutcome]) -> usize {
    let mut best = 0;
    let mut current = 0;
    for outcome in outcomes {
        if outcome.is_failed() {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Whether a failure streak with bounded pass tolerance reaches
/// `min_consecutive` failures.
fn hysteresis_streak_reaches(
    outcomes: &[TestOutcome],
    min_consecutive: usize,
    hysteresis_threshold: f64,
    min_failure_rate: f64,
) -> bool {
    let mut failures = 0usize;
    let mut passes = 0usize;
    for outcome in outcomes {
        if outcome.is_failed() {
            failures += 1;
            if failures >= min_consecutive {
                return true;
            }
        } else if failures > 0 {
            // Would admitting this non-failure keep the streak within
            // bounds?
            let total = (failures + passes + 1) as f64;
            let pass_ratio = (passes + 1) as f64 / total;
            let failure_rate = failures as f64 / total;
            if pass_ratio <= hysteresis_threshold && failure_rate >= min_failure_rate {
                passes += 1;
            } else {
                failures = 0;
                passes = 0;
            }
        }
    }
    false
}

/// The outcome of comparing two session sets' composite health.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthComparison {
    /// Composite health of the base side, in `[0, 100]`.
    pub base_health: f64,

    /// Composite health of the target side, in `[0, 100]`.
    pub target_health: f64,

    /// `target_health - base_health`.
    pub health_difference: f64,

    /// Whether the target side scored strictly higher.
    pub improved: bool,
}

/// Suite health at a glance.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthReport {
    /// Sessions in scope.
    pub total_sessions: usize,

    /// Results of record, excluding rerun attempts.
    pub total_tests: usize,

    /// Share of results of record that passed.
    pub pass_rate: f64,

    /// Composite health score in `[0, 100]`.
    pub health_score: f64,

    /// Tests that needed reruns to pass, sorted by nodeid.
    pub flaky_tests: Vec<NodeId>,

    /// Tests with at least 3 consecutive failed final outcomes.
    pub consistently_failing_tests: Vec<NodeId>,
}

/// Rerun dependence and failure concentration at a glance.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StabilityReport {
    /// Rerun groups in scope, recovered or not.
    pub total_rerun_groups: usize,

    /// Rerun groups whose final attempt passed.
    pub recovered_rerun_groups: usize,

    /// `100 × recovered/total` rerun groups; 100 when there are none.
    pub rerun_recovery_rate: f64,

    /// Tests that needed reruns to pass, sorted by nodeid.
    pub flaky_tests: Vec<NodeId>,

    /// The most-failing tests, capped at 10.
    pub most_failing_tests: Vec<TestFailureCount>,
}

/// Timing at a glance.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PerformanceReport {
    /// Sessions in scope.
    pub total_sessions: usize,

    /// Mean duration of results of record, in seconds.
    pub average_test_duration_secs: f64,

    /// Mean session duration, in seconds.
    pub average_session_duration_secs: f64,

    /// The slowest tests by total recorded duration, capped at 10.
    pub slowest_tests: Vec<TestDurationTotal>,
}

/// A test and how many of its results of record failed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestFailureCount {
    /// The test's nodeid.
    pub nodeid: NodeId,

    /// Failed results of record.
    pub failures: usize,
}

/// A test and its total recorded duration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestDurationTotal {
    /// The test's nodeid.
    pub nodeid: NodeId,

    /// Total duration across every attempt, in seconds.
    pub total_secs: f64,
}
