// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{helpers, stats};
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use insight_model::{NodeId, TestOutcome, TestSession};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Python exception names recognized when mining error patterns, ordered
/// alphabetically.
static PYTHON_EXCEPTIONS: &[&str] = &[
    "AssertionError",
    "AttributeError",
    "ConnectionError",
    "FileNotFoundError",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "MemoryError",
    "ModuleNotFoundError",
    "NameError",
    "NotImplementedError",
    "OSError",
    "OverflowError",
    "PermissionError",
    "RecursionError",
    "RuntimeError",
    "StopIteration",
    "TimeoutError",
    "TypeError",
    "UnicodeDecodeError",
    "ValueError",
    "ZeroDivisionError",
];

static WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Test-scoped insights: distributions, reliability, error mining, and
/// co-failure structure.
///
/// Obtained from [`Insights::tests`](crate::insights::Insights::tests).
#[derive(Clone, Copy, Debug)]
pub struct TestInsights<'a> {
    sessions: &'a [TestSession],
}

impl<'a> TestInsights<'a> {
    pub(crate) fn new(sessions: &'a [TestSession]) -> Self {
        Self { sessions }
    }

    /// Counts every recorded attempt by outcome, rerun attempts included.
    ///
    /// Every outcome appears in the report, with a zero count where none
    /// were recorded.
    pub fn outcome_distribution(&self) -> OutcomeDistribution {
        let mut counts: BTreeMap<TestOutcome, usize> = BTreeMap::new();
        for result in self
            .sessions
            .iter()
            .flat_map(|session| session.test_results())
        {
            *counts.entry(result.outcome()).or_insert(0) += 1;
        }
        let total_attempts: usize = counts.values().sum();

        let outcomes = TestOutcome::ALL
            .iter()
            .map(|&outcome| {
                let count = counts.get(&outcome).copied().unwrap_or(0);
                let percentage = if total_attempts == 0 {
                    0.0
                } else {
                    100.0 * count as f64 / total_attempts as f64
                };
                OutcomeShare {
                    outcome,
                    count,
                    percentage,
                }
            })
            .collect();

        OutcomeDistribution {
            total_attempts,
            outcomes,
        }
    }

    /// Lists tests that needed reruns to pass, ranked by rerun volume.
    ///
    /// Only recovered rerun groups contribute. The recovery pass rate is
    /// `sessions_recovered / (reruns + sessions_recovered)`: the share of
    /// attempts beyond the first per-session attempt that ended in a pass.
    pub fn unreliable_tests(&self) -> Vec<UnreliableTest> {
        let mut by_test: BTreeMap<&NodeId, (usize, usize)> = BTreeMap::new();
        for group in self
            .sessions
            .iter()
            .flat_map(|session| session.rerun_test_groups())
            .filter(|group| group.is_recovered())
        {
            let entry = by_test.entry(group.nodeid()).or_insert((0, 0));
            entry.0 += group.rerun_count();
            entry.1 += 1;
        }

        by_test
            .into_iter()
            .map(|(nodeid, (reruns, sessions_recovered))| UnreliableTest {
                nodeid: nodeid.clone(),
                reruns,
                sessions_recovered,
                recovery_pass_rate: sessions_recovered as f64
                    / (reruns + sessions_recovered) as f64,
            })
            .sorted_by(|a, b| b.reruns.cmp(&a.reruns).then_with(|| a.nodeid.cmp(&b.nodeid)))
            .collect()
    }

    /// Summarizes how much of the suite depends on reruns.
    pub fn reliability_metrics(&self) -> ReliabilityMetrics {
        let total_tests = helpers::final_outcome_series(self.sessions).len();
        let unstable: BTreeSet<&NodeId> = self
            .sessions
            .iter()
            .flat_map(|session| session.rerun_test_groups())
            .map(|group| group.nodeid())
            .collect();
        let unstable_tests = unstable.len();

        let total_rerun_groups = self
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

        let unstable_ratio = if total_tests == 0 {
            0.0
        } else {
            unstable_tests as f64 / total_tests as f64
        };
        let rerun_recovery_rate = if total_rerun_groups == 0 {
            100.0
        } else {
            100.0 * recovered_rerun_groups as f64 / total_rerun_groups as f64
        };

        ReliabilityMetrics {
            total_tests,
            unstable_tests,
            reliability_index: 100.0 * (1.0 - unstable_ratio),
            total_rerun_groups,
            recovered_rerun_groups,
            rerun_recovery_rate,
            health_score_penalty: 100.0 * unstable_ratio,
        }
    }

    /// Ranks tests by total recorded duration, rerun attempts included.
    pub fn slowest_tests(&self, limit: usize) -> SlowestTestsReport {
        let mut by_test: BTreeMap<&NodeId, (usize, f64)> = BTreeMap::new();
        let mut total_duration_secs = 0.0;
        let mut attempts = 0usize;
        for result in self
            .sessions
            .iter()
            .flat_map(|session| session.test_results())
        {
            let secs = result.duration().as_secs_f64();
            let entry = by_test.entry(result.nodeid()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += secs;
            total_duration_secs += secs;
            attempts += 1;
        }

        let tests = by_test
            .into_iter()
            .map(|(nodeid, (runs, total_secs))| SlowTest {
                nodeid: nodeid.clone(),
                runs,
                total_secs,
                average_secs: total_secs / runs as f64,
            })
            .sorted_by(|a, b| {
                b.total_secs
                    .total_cmp(&a.total_secs)
                    .then_with(|| a.nodeid.cmp(&b.nodeid))
            })
            .take(limit)
            .collect();

        SlowestTestsReport {
            tests,
            average_duration_secs: if attempts == 0 {
                0.0
            } else {
                total_duration_secs / attempts as f64
            },
            total_duration_secs,
        }
    }

    /// Groups failures by the Python exception they raised.
    ///
    /// The pattern for a failed result is the first recognized exception
    /// name in its `longreprtext` together with the rest of that line,
    /// truncated to 100 characters. Failures whose text names no known
    /// exception group under their first non-empty line; failures with no
    /// captured text are skipped. Tests that produced more than one
    /// distinct pattern are flagged as multi-error.
    pub fn error_patterns(&self) -> ErrorPatternReport {
        let mut by_pattern: BTreeMap<String, (usize, BTreeSet<NodeId>)> = BTreeMap::new();
        let mut by_test: BTreeMap<&NodeId, BTreeSet<String>> = BTreeMap::new();

        for result in self
            .sessions
            .iter()
            .flat_map(|session| session.test_results())
            .filter(|result| result.outcome().is_failed())
        {
            let Some(pattern) = result.longreprtext().and_then(extract_error_pattern) else {
                continue;
            };
            let entry = by_pattern.entry(pattern.clone()).or_default();
            entry.0 += 1;
            entry.1.insert(result.nodeid().clone());
            by_test
                .entry(result.nodeid())
                .or_default()
                .insert(pattern);
        }

        let patterns = by_pattern
            .into_iter()
            .map(|(pattern, (occurrences, affected))| ErrorPattern {
                pattern,
                occurrences,
                affected_tests: affected.into_iter().collect(),
            })
            .sorted_by(|a, b| {
                b.occurrences
                    .cmp(&a.occurrences)
                    .then_with(|| a.pattern.cmp(&b.pattern))
            })
            .collect();
        let multi_error_tests = by_test
            .into_iter()
            .filter(|(_, patterns)| patterns.len() > 1)
            .map(|(nodeid, _)| nodeid.clone())
            .collect();

        ErrorPatternReport {
            patterns,
            multi_error_tests,
        }
    }

    /// Finds tests whose failures cluster at particular hours or weekdays.
    ///
    /// Only tests with at least 3 failures are considered. An hour is a
    /// peak when it holds at least 2 failures and more than twice the
    /// uniform share; a weekday when it holds at least 2 and more than 1.5
    /// times the uniform share. Tests with no peak are omitted.
    pub fn seasonal_patterns(&self) -> SeasonalPatternReport {
        let mut by_test: BTreeMap<&NodeId, Vec<DateTime<FixedOffset>>> = BTreeMap::new();
        for result in self
            .sessions
            .iter()
            .flat_map(|session| session.test_results())
            .filter(|result| result.outcome().is_failed())
        {
            by_test
                .entry(result.nodeid())
                .or_default()
                .push(result.start_time());
        }

        let tests = by_test
            .into_iter()
            .filter(|(_, timestamps)| timestamps.len() >= 3)
            .filter_map(|(nodeid, timestamps)| {
                let failures = timestamps.len();
                let mut hour_bins = [0usize; 24];
                let mut day_bins = [0usize; 7];
                for timestamp in &timestamps {
                    hour_bins[timestamp.hour() as usize] += 1;
                    day_bins[timestamp.weekday().num_days_from_monday() as usize] += 1;
                }

                let hour_floor = 2.0 * failures as f64 / 24.0;
                let peak_hours: Vec<u32> = (0..24)
                    .filter(|&hour| {
                        let count = hour_bins[hour as usize];
                        count >= 2 && count as f64 > hour_floor
                    })
                    .collect();
                let day_floor = 1.5 * failures as f64 / 7.0;
                let peak_days: Vec<String> = (0..7)
                    .filter(|&day| {
                        let count = day_bins[day];
                        count >= 2 && count as f64 > day_floor
                    })
                    .map(|day| WEEKDAYS[day].to_owned())
                    .collect();

                (!peak_hours.is_empty() || !peak_days.is_empty()).then(|| SeasonalPattern {
                    nodeid: nodeid.clone(),
                    failures,
                    peak_hours,
                    peak_days,
                })
            })
            .sorted_by(|a, b| {
                b.failures
                    .cmp(&a.failures)
                    .then_with(|| a.nodeid.cmp(&b.nodeid))
            })
            .collect();

        SeasonalPatternReport { tests }
    }

    /// Infers failure dependencies from per-session co-failures.
    ///
    /// A pair is considered once both tests have failed in at least 3
    /// sessions. The edge strength is the share of one test's failing
    /// sessions in which the other also failed; an edge is directed when
    /// that share exceeds 0.7 and beats the reverse direction by more than
    /// 0.2, and bidirectional otherwise.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut failure_counts: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut co_failures: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();
        for session in self.sessions {
            let failed: Vec<NodeId> = session
                .final_outcomes()
                .into_iter()
                .filter(|(_, outcome)| outcome.is_failed())
                .map(|(nodeid, _)| nodeid)
                .collect();
            for nodeid in &failed {
                *failure_counts.entry(nodeid.clone()).or_insert(0) += 1;
            }
            // `final_outcomes` iterates in sorted order, so a < b holds.
            for (a, b) in failed.iter().tuple_combinations() {
                *co_failures.entry((a.clone(), b.clone())).or_insert(0) += 1;
            }
        }

        let edges = co_failures
            .into_iter()
            .filter_map(|((a, b), co)| {
                let failures_a = failure_counts[&a];
                let failures_b = failure_counts[&b];
                if failures_a < 3 || failures_b < 3 {
                    return None;
                }
                let ratio_ab = co as f64 / failures_a as f64;
                let ratio_ba = co as f64 / failures_b as f64;
                if ratio_ab > 0.7 && ratio_ab - ratio_ba > 0.2 {
                    Some(DependencyEdge {
                        from: a,
                        to: b,
                        strength: ratio_ab,
                        directed: true,
                    })
                } else if ratio_ba > 0.7 && ratio_ba - ratio_ab > 0.2 {
                    Some(DependencyEdge {
                        from: b,
                        to: a,
                        strength: ratio_ba,
                        directed: true,
                    })
                } else if ratio_ab.max(ratio_ba) > 0.7 {
                    Some(DependencyEdge {
                        from: a,
                        to: b,
                        strength: ratio_ab.max(ratio_ba),
                        directed: false,
                    })
                } else {
                    None
                }
            })
            .sorted_by(|a, b| {
                b.strength
                    .total_cmp(&a.strength)
                    .then_with(|| (&a.from, &a.to).cmp(&(&b.from, &b.to)))
            })
            .collect();

        DependencyGraph { edges }
    }

    /// Finds pairs of tests whose pass/fail verdicts move together.
    ///
    /// The phi coefficient is computed over sessions containing both tests
    /// (at least 3 required); pairs with `|phi| > 0.5` are reported.
    pub fn correlations(&self) -> CorrelationReport {
        let per_session: Vec<BTreeMap<NodeId, TestOutcome>> =
            helpers::sorted_by_start_time(self.sessions)
                .into_iter()
                .map(|session| session.final_outcomes())
                .collect();
        let tests: Vec<&NodeId> = per_session
            .iter()
            .flat_map(|outcomes| outcomes.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let pairs = tests
            .iter()
            .tuple_combinations()
            .filter_map(|(&a, &b)| {
                let mut failed_a = Vec::new();
                let mut failed_b = Vec::new();
                for outcomes in &per_session {
                    if let (Some(outcome_a), Some(outcome_b)) = (outcomes.get(a), outcomes.get(b))
                    {
                        failed_a.push(outcome_a.is_failed());
                        failed_b.push(outcome_b.is_failed());
                    }
                }
                if failed_a.len() < 3 {
                    return None;
                }
                let phi = stats::phi_coefficient(&failed_a, &failed_b);
                (phi.abs() > 0.5).then(|| TestCorrelation {
                    test_a: a.clone(),
                    test_b: b.clone(),
                    phi,
                    shared_sessions: failed_a.len(),
                })
            })
            .sorted_by(|a, b| {
                b.phi
                    .abs()
                    .total_cmp(&a.phi.abs())
                    .then_with(|| (&a.test_a, &a.test_b).cmp(&(&b.test_a, &b.test_b)))
            })
            .collect();

        CorrelationReport { pairs }
    }
}

/// Extracts a grouping pattern from a failure's captured representation.
fn extract_error_pattern(longreprtext: &str) -> Option<String> {
    for line in longreprtext.lines() {
        let earliest = PYTHON_EXCEPTIONS
            .iter()
            .filter_map(|name| line.find(name).map(|position| (position, *name)))
            .min_by_key(|&(position, _)| position);
        if let Some((position, _)) = earliest {
            return Some(truncate_pattern(&line[position..]));
        }
    }
    longreprtext
        .lines()
        .map(clean_line)
        .find(|line| !line.is_empty())
        .map(truncate_pattern)
}

/// Strips pytest's `E ` margin marker and surrounding whitespace.
fn clean_line(line: &str) -> &str {
    let trimmed = line.trim();
    match trimmed.strip_prefix("E ") {
        Some(rest) => rest.trim_start(),
        None => trimmed,
    }
}

fn truncate_pattern(text: &str) -> String {
    text.trim().chars().take(100).collect()
}

/// Attempt counts and percentages per outcome.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutcomeDistribution {
    /// Total attempts counted, rerun attempts included.
    pub total_attempts: usize,

    /// One entry per outcome, in declaration order.
    pub outcomes: Vec<OutcomeShare>,
}

/// The share of attempts that ended in one outcome.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutcomeShare {
    /// The outcome being counted.
    pub outcome: TestOutcome,

    /// The number of attempts with this outcome.
    pub count: usize,

    /// The percentage of all attempts, 0 when nothing was recorded.
    pub percentage: f64,
}

/// A test that needed reruns to reach a passing verdict.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnreliableTest {
    /// The test's nodeid.
    pub nodeid: NodeId,

    /// Rerun attempts beyond the first, across all recovered groups.
    pub reruns: usize,

    /// Sessions in which the test recovered.
    pub sessions_recovered: usize,

    /// `sessions_recovered / (reruns + sessions_recovered)`.
    pub recovery_pass_rate: f64,
}

/// Suite-level rerun dependence.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReliabilityMetrics {
    /// Distinct tests in scope.
    pub total_tests: usize,

    /// Distinct tests with at least one rerun group.
    pub unstable_tests: usize,

    /// `100 × (1 − unstable/total)`; 100 when there are no tests.
    pub reliability_index: f64,

    /// Rerun groups in scope, recovered or not.
    pub total_rerun_groups: usize,

    /// Rerun groups whose final attempt passed.
    pub recovered_rerun_groups: usize,

    /// `100 × recovered/total` rerun groups; 100 when there are none.
    pub rerun_recovery_rate: f64,

    /// `100 × unstable/total`; 0 when there are no tests.
    pub health_score_penalty: f64,
}

/// The slowest tests plus whole-suite duration aggregates.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SlowestTestsReport {
    /// Up to `limit` tests, slowest first.
    pub tests: Vec<SlowTest>,

    /// Mean attempt duration over every recorded attempt, in seconds.
    pub average_duration_secs: f64,

    /// Total recorded duration over every attempt, in seconds.
    pub total_duration_secs: f64,
}

/// Cumulative timing for one test.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SlowTest {
    /// The test's nodeid.
    pub nodeid: NodeId,

    /// Recorded attempts, reruns included.
    pub runs: usize,

    /// Total recorded duration in seconds.
    pub total_secs: f64,

    /// Mean duration per attempt in seconds.
    pub average_secs: f64,
}

/// Failures grouped by exception pattern.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ErrorPatternReport {
    /// Patterns ranked by occurrence count.
    pub patterns: Vec<ErrorPattern>,

    /// Tests that produced more than one distinct pattern.
    pub multi_error_tests: Vec<NodeId>,
}

/// One mined failure pattern.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ErrorPattern {
    /// The pattern text, truncated to 100 characters.
    pub pattern: String,

    /// The number of failed results matching the pattern.
    pub occurrences: usize,

    /// Sorted distinct tests that produced the pattern.
    pub affected_tests: Vec<NodeId>,
}

/// Tests whose failures cluster in time.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeasonalPatternReport {
    /// Tests with at least one peak hour or weekday, most failures first.
    pub tests: Vec<SeasonalPattern>,
}

/// Failure clustering for one test.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeasonalPattern {
    /// The test's nodeid.
    pub nodeid: NodeId,

    /// Total failures observed for the test.
    pub failures: usize,

    /// Hours of day (0-23) holding a disproportionate share of failures.
    pub peak_hours: Vec<u32>,

    /// Weekday names holding a disproportionate share of failures.
    pub peak_days: Vec<String>,
}

/// Inferred failure dependencies.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyGraph {
    /// Edges ranked by strength.
    pub edges: Vec<DependencyEdge>,
}

/// One co-failure edge.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyEdge {
    /// The test whose failures imply the other's.
    pub from: NodeId,

    /// The implied test.
    pub to: NodeId,

    /// Share of `from`'s failing sessions in which `to` also failed.
    pub strength: f64,

    /// Whether the implication holds in one direction only.
    pub directed: bool,
}

/// Pairs of tests with strongly linked verdicts.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CorrelationReport {
    /// Pairs with `|phi| > 0.5`, strongest first.
    pub pairs: Vec<TestCorrelation>,
}

/// The verdict correlation between two tests.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestCorrelation {
    /// The lexicographically smaller nodeid.
    pub test_a: NodeId,

    /// The lexicographically larger nodeid.
    pub test_b: NodeId,

    /// The phi coefficient over shared sessions, in `[-1, 1]`.
    pub phi: f64,

    /// Sessions containing final outcomes for both tests.
    pub shared_sessions: usize,
}
