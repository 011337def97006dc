// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{helpers, stats};
use indexmap::IndexMap;
use insight_model::TestSession;
use serde::{Deserialize, Serialize};

/// Session-scoped insights: composite health, reliability, and environment
/// effects.
///
/// Obtained from [`Insights::sessions`](crate::insights::Insights::sessions).
#[derive(Clone, Copy, Debug)]
pub struct SessionInsights<'a> {
    sessions: &'a [TestSession],
}

impl<'a> SessionInsights<'a> {
    pub(crate) fn new(sessions: &'a [TestSession]) -> Self {
        Self { sessions }
    }

    /// Scores the overall health of the session set on a 0-100 scale.
    ///
    /// The score blends pass rate (50%), absence of flakiness (20%),
    /// duration stability (15%), and absence of consistently failing tests
    /// (15%), and is clamped to `[0, 100]`. An empty session set scores 0.
    pub fn health_score(&self) -> HealthScoreReport {
        let components = HealthComponents::measure(self.sessions);
        HealthScoreReport {
            score: components.score(),
            pass_rate: components.pass_rate,
            flaky_ratio: components.flaky_ratio,
            duration_variance: components.duration_variance,
            consistently_failing_ratio: components.consistently_failing_ratio,
            total_sessions: self.sessions.len(),
            total_tests: components.total_tests,
        }
    }

    /// Scores how dependable the suite's verdicts are on a 0-100 scale.
    ///
    /// Unlike [`health_score`](Self::health_score), which asks "is the suite
    /// passing", the reliability index asks "can the results be trusted":
    /// it rewards consistent per-test verdicts and consistent behavior
    /// across environments.
    pub fn reliability_index(&self) -> ReliabilityIndexReport {
        if self.sessions.is_empty() {
            return ReliabilityIndexReport::default();
        }

        let components = HealthComponents::measure(self.sessions);
        let environment_consistency =
            environment_consistency(&environment_pass_rates(self.sessions));
        let test_consistency = test_consistency(self.sessions);

        let index = 100.0
            * (0.4 * components.pass_rate
                + 0.3 * (1.0 - components.flaky_ratio)
                + 0.15 * environment_consistency
                + 0.15 * test_consistency);
        ReliabilityIndexReport {
            index: index.clamp(0.0, 100.0),
            pass_rate: components.pass_rate,
            flaky_ratio: components.flaky_ratio,
            environment_consistency,
            test_consistency,
        }
    }

    /// Breaks pass rates down by the `environment` session tag.
    ///
    /// Sessions without the tag fall into the `unknown` group. Groups are
    /// listed in order of first appearance in session chronology.
    pub fn environment_impact(&self) -> EnvironmentImpact {
        let mut groups: IndexMap<String, Vec<f64>> = IndexMap::new();
        for session in helpers::sorted_by_start_time(self.sessions) {
            let environment = session.tag("environment").unwrap_or("unknown").to_owned();
            groups
                .entry(environment)
                .or_default()
                .push(session.outcome_counts().pass_rate());
        }

        let environments: IndexMap<String, EnvironmentStats> = groups
            .iter()
            .map(|(environment, rates)| {
                (
                    environment.clone(),
                    EnvironmentStats {
                        sessions: rates.len(),
                        average_pass_rate: stats::mean(rates),
                    },
                )
            })
            .collect();
        let consistency = environment_consistency(
            &environments
                .values()
                .map(|stats| stats.average_pass_rate)
                .collect::<Vec<_>>(),
        );

        EnvironmentImpact {
            environments,
            consistency,
        }
    }
}

/// The measured inputs to the composite health score.
struct HealthComponents {
    pass_rate: f64,
    flaky_ratio: f64,
    duration_variance: f64,
    consistently_failing_ratio: f64,
    total_tests: usize,
    empty: bool,
}

impl HealthComponents {
    fn measure(sessions: &[TestSession]) -> Self {
        let series = helpers::final_outcome_series(sessions);
        let total_tests = series.len();

        let flaky = sessions
            .iter()
            .flat_map(|session| session.rerun_test_groups())
            .filter(|group| group.is_recovered())
            .map(|group| group.nodeid())
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        // Consistently failing here means at least 3 runs with a failure
        // rate above 90%.
        let consistently_failing = series
            .values()
            .filter(|outcomes| {
                let failures = outcomes.iter().filter(|outcome| outcome.is_failed()).count();
                outcomes.len() >= 3 && failures as f64 / outcomes.len() as f64 > 0.9
            })
            .count();

        let durations: Vec<f64> = sessions
            .iter()
            .map(|session| session.session_duration().as_secs_f64())
            .collect();

        let ratio = |count: usize| {
            if total_tests == 0 {
                0.0
            } else {
                count as f64 / total_tests as f64
            }
        };

        Self {
            pass_rate: helpers::aggregate_counts(sessions).pass_rate(),
            flaky_ratio: ratio(flaky),
            duration_variance: stats::variance(&durations),
            consistently_failing_ratio: ratio(consistently_failing),
            total_tests,
            empty: sessions.is_empty(),
        }
    }

    fn score(&self) -> f64 {
        if self.empty {
            return 0.0;
        }
        let score = 50.0 * self.pass_rate
            + 20.0 * (1.0 - self.flaky_ratio)
            + 15.0 / (1.0 + 0.1 * self.duration_variance)
            + 15.0 * (1.0 - self.consistently_failing_ratio);
        score.clamp(0.0, 100.0)
    }
}

/// Scores a session set with the composite health formula.
///
/// Shared with [`Analysis::compare_health`](crate::analysis::Analysis::compare_health).
pub(crate) fn composite_health_score(sessions: &[TestSession]) -> f64 {
    HealthComponents::measure(sessions).score()
}

/// Mean per-session pass rate for each environment, in first-appearance
/// order.
fn environment_pass_rates(sessions: &[TestSession]) -> Vec<f64> {
    let mut groups: IndexMap<&str, Vec<f64>> = IndexMap::new();
    for session in helpers::sorted_by_start_time(sessions) {
        groups
            .entry(session.tag("environment").unwrap_or("unknown"))
            .or_default()
            .push(session.outcome_counts().pass_rate());
    }
    groups.values().map(|rates| stats::mean(rates)).collect()
}

/// How uniformly the suite behaves across environments, in `(0, 1]`.
///
/// One environment (or none) is perfectly consistent.
fn environment_consistency(per_environment_rates: &[f64]) -> f64 {
    1.0 / (1.0 + 10.0 * stats::variance(per_environment_rates))
}

/// Mean dominant-outcome share across tests: 1.0 when every test always
/// produces the same outcome.
fn test_consistency(sessions: &[TestSession]) -> f64 {
    let series = helpers::final_outcome_series(sessions);
    if series.is_empty() {
        return 1.0;
    }
    let shares: Vec<f64> = series
        .values()
        .map(|outcomes| {
            let mut counts = std::collections::BTreeMap::new();
            for outcome in outcomes {
                *counts.entry(outcome).or_insert(0usize) += 1;
            }
            let modal = counts.values().copied().max().unwrap_or(0);
            modal as f64 / outcomes.len() as f64
        })
        .collect();
    stats::mean(&shares)
}

/// The composite health score and its inputs.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthScoreReport {
    /// The composite score in `[0, 100]`.
    pub score: f64,

    /// Aggregate pass rate over all sessions.
    pub pass_rate: f64,

    /// Share of tests with a recovered rerun group.
    pub flaky_ratio: f64,

    /// Variance of session durations, in seconds squared.
    pub duration_variance: f64,

    /// Share of tests failing more than 90% of at least 3 runs.
    pub consistently_failing_ratio: f64,

    /// The number of sessions scored.
    pub total_sessions: usize,

    /// The number of distinct tests scored.
    pub total_tests: usize,
}

/// The reliability index and its inputs.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReliabilityIndexReport {
    /// The index in `[0, 100]`.
    pub index: f64,

    /// Aggregate pass rate over all sessions.
    pub pass_rate: f64,

    /// Share of tests with a recovered rerun group.
    pub flaky_ratio: f64,

    /// How uniformly the suite behaves across environments, in `(0, 1]`.
    pub environment_consistency: f64,

    /// Mean dominant-outcome share across tests.
    pub test_consistency: f64,
}

/// Pass rates broken down by environment.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnvironmentImpact {
    /// Per-environment statistics, in order of first appearance.
    pub environments: IndexMap<String, EnvironmentStats>,

    /// How uniform the per-environment pass rates are, in `(0, 1]`.
    pub consistency: f64,
}

/// Statistics for one environment group.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnvironmentStats {
    /// The number of sessions in this environment.
    pub sessions: usize,

    /// Mean per-session pass rate.
    pub average_pass_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};
    use insight_model::{TestOutcome, TestResult};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn session(
        id: &str,
        start: &str,
        environment: Option<&str>,
        outcomes: &[(&str, TestOutcome)],
    ) -> TestSession {
        let start: DateTime<FixedOffset> = start.parse().unwrap();
        let mut builder = TestSession::builder(id, "api-service", start)
            .duration(Duration::from_secs(100));
        if let Some(environment) = environment {
            builder = builder.tag("environment", environment);
        }
        let mut session = builder.build().unwrap();
        for (nodeid, outcome) in outcomes {
            session.add_test_result(
                TestResult::builder(*nodeid, *outcome, start)
                    .duration(Duration::from_secs(1))
                    .build()
                    .unwrap(),
            );
        }
        session
    }

    #[test]
    fn perfect_history_scores_100() {
        let sessions: Vec<TestSession> = (0..3)
            .map(|i| {
                session(
                    &format!("s{i}"),
                    &format!("2026-03-0{}T10:00:00+00:00", i + 1),
                    Some("ci"),
                    &[
                        ("tests/test_a.py::test_one", TestOutcome::Passed),
                        ("tests/test_a.py::test_two", TestOutcome::Passed),
                    ],
                )
            })
            .collect();

        let report = SessionInsights::new(&sessions).health_score();
        assert_eq!(report.score, 100.0);
        assert_eq!(report.pass_rate, 1.0);
        assert_eq!(report.flaky_ratio, 0.0);

        let reliability = SessionInsights::new(&sessions).reliability_index();
        assert_eq!(reliability.index, 100.0);
        assert_eq!(reliability.test_consistency, 1.0);
    }

    #[test]
    fn empty_history_scores_zero() {
        let report = SessionInsights::new(&[]).health_score();
        assert_eq!(report.score, 0.0);
        assert_eq!(report.total_sessions, 0);

        let reliability = SessionInsights::new(&[]).reliability_index();
        assert_eq!(reliability.index, 0.0);
    }

    #[test]
    fn all_failing_history_stays_in_bounds() {
        let sessions: Vec<TestSession> = (0..4)
            .map(|i| {
                session(
                    &format!("s{i}"),
                    &format!("2026-03-0{}T10:00:00+00:00", i + 1),
                    None,
                    &[("tests/test_a.py::test_one", TestOutcome::Failed)],
                )
            })
            .collect();

        let report = SessionInsights::new(&sessions).health_score();
        // Pass-rate and consistently-failing components bottom out; the
        // duration-stability component keeps the score above zero.
        assert!(report.score > 0.0 && report.score < 50.0, "{}", report.score);
        assert_eq!(report.consistently_failing_ratio, 1.0);
    }

    #[test]
    fn environment_grouping_and_consistency() {
        let sessions = vec![
            session(
                "s1",
                "2026-03-01T10:00:00+00:00",
                Some("staging"),
                &[
                    ("tests/test_a.py::test_one", TestOutcome::Passed),
                    ("tests/test_a.py::test_two", TestOutcome::Passed),
                ],
            ),
            session(
                "s2",
                "2026-03-02T10:00:00+00:00",
                Some("production"),
                &[
                    ("tests/test_a.py::test_one", TestOutcome::Failed),
                    ("tests/test_a.py::test_two", TestOutcome::Failed),
                ],
            ),
            session(
                "s3",
                "2026-03-03T10:00:00+00:00",
                None,
                &[("tests/test_a.py::test_one", TestOutcome::Passed)],
            ),
        ];

        let impact = SessionInsights::new(&sessions).environment_impact();
        assert_eq!(impact.environments.len(), 3);
        assert_eq!(impact.environments["staging"].average_pass_rate, 1.0);
        assert_eq!(impact.environments["production"].average_pass_rate, 0.0);
        assert!(impact.environments.contains_key("unknown"));
        // Wildly different environments: consistency drops well below 1.
        assert!(impact.consistency < 0.5, "{}", impact.consistency);

        // First-appearance ordering.
        let order: Vec<&str> = impact.environments.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["staging", "production", "unknown"]);
    }
}
