// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report scenarios: analysis summaries, the insight views, and session-set
//! comparisons, all checked against hand-computed values for the corpus.

use crate::fixtures::*;
use insight_engine::{
    analysis::Analysis,
    compare::{Comparison, SideSummary},
    insights::{
        DependencyEdge, Insights, SeasonalPattern, TestTimeline, TrendDirection, TrendPoint,
        UnreliableTest,
    },
};
use insight_model::{NodeId, TestOutcome};
use maplit::btreemap;
use pretty_assertions::assert_eq;

#[test]
fn health_report_summarizes_the_api_history() {
    let report = Analysis::new(api_history()).health_report();

    assert_eq!(report.total_sessions, 10);
    assert_eq!(report.total_tests, 50);
    assert_eq!(report.pass_rate, 0.7);
    // 50 * 0.7 pass rate + 20 * 0.8 non-flaky + 15 duration stability
    // + 15 * 0.8 non-consistently-failing.
    assert_close(report.health_score, 78.0);
    assert_eq!(report.flaky_tests, vec![NodeId::from(REFUND)]);
    assert_eq!(
        report.consistently_failing_tests,
        vec![NodeId::from(LOGIN), NodeId::from(RANKING)],
    );
}

#[test]
fn stability_report_counts_reruns_and_failures() {
    let report = Analysis::new(api_history()).stability_report();

    assert_eq!(report.total_rerun_groups, 3);
    assert_eq!(report.recovered_rerun_groups, 3);
    assert_eq!(report.rerun_recovery_rate, 100.0);
    assert_eq!(report.flaky_tests, vec![NodeId::from(REFUND)]);

    let failing: Vec<(&str, usize)> = report
        .most_failing_tests
        .iter()
        .map(|entry| (entry.nodeid.as_str(), entry.failures))
        .collect();
    assert_eq!(failing, [(RANKING, 10), (LOGIN, 5)]);
}

#[test]
fn performance_report_ranks_by_total_time() {
    let report = Analysis::new(api_history()).performance_report();

    assert_eq!(report.total_sessions, 10);
    assert_close(report.average_test_duration_secs, 3.2);
    assert_eq!(report.average_session_duration_secs, 300.0);

    let slowest: Vec<(&str, f64)> = report
        .slowest_tests
        .iter()
        .map(|entry| (entry.nodeid.as_str(), entry.total_secs))
        .collect();
    // test_refund's total includes its three 2s rerun attempts; the 10s tie
    // breaks by nodeid.
    assert_eq!(
        slowest,
        [
            (INDEX, 100.0),
            (REFUND, 26.0),
            (RANKING, 20.0),
            (LOGIN, 10.0),
            (CHARGE, 10.0),
        ],
    );
}

#[test]
fn health_comparison_splits_the_history_in_half() {
    let comparison = Analysis::new(api_history())
        .compare_health(None, None)
        .expect("both halves are non-empty");

    // The login regression drags the later half down.
    assert_close(comparison.base_health, 83.0);
    assert_close(comparison.target_health, 70.0);
    assert_close(comparison.health_difference, -13.0);
    assert!(!comparison.improved);
}

#[test]
fn outcome_distribution_covers_every_outcome() {
    let insights = Insights::new(api_history());
    let distribution = insights.tests().outcome_distribution();

    assert_eq!(distribution.total_attempts, 53);
    assert_eq!(distribution.outcomes.len(), 7);

    let share = |outcome: TestOutcome| {
        distribution
            .outcomes
            .iter()
            .find(|share| share.outcome == outcome)
            .expect("every outcome is listed")
    };
    assert_eq!(share(TestOutcome::Passed).count, 35);
    assert_eq!(share(TestOutcome::Failed).count, 15);
    assert_eq!(share(TestOutcome::Rerun).count, 3);
    assert_eq!(share(TestOutcome::Skipped).count, 0);
    assert_eq!(share(TestOutcome::Skipped).percentage, 0.0);
    assert_close(share(TestOutcome::Passed).percentage, 100.0 * 35.0 / 53.0);

    let total: f64 = distribution
        .outcomes
        .iter()
        .map(|share| share.percentage)
        .sum();
    assert_close(total, 100.0);
}

#[test]
fn unreliable_tests_and_reliability_metrics_agree() {
    let insights = Insights::new(api_history());

    assert_eq!(
        insights.tests().unreliable_tests(),
        vec![UnreliableTest {
            nodeid: NodeId::from(REFUND),
            reruns: 3,
            sessions_recovered: 3,
            recovery_pass_rate: 0.5,
        }],
    );

    let metrics = insights.tests().reliability_metrics();
    assert_eq!(metrics.total_tests, 5);
    assert_eq!(metrics.unstable_tests, 1);
    assert_eq!(metrics.reliability_index, 80.0);
    assert_eq!(metrics.total_rerun_groups, 3);
    assert_eq!(metrics.recovered_rerun_groups, 3);
    assert_eq!(metrics.rerun_recovery_rate, 100.0);
    assert_eq!(metrics.health_score_penalty, 20.0);
}

#[test]
fn slowest_tests_report_includes_rerun_attempts() {
    let report = Insights::new(api_history()).tests().slowest_tests(3);

    let tests: Vec<(&str, usize, f64, f64)> = report
        .tests
        .iter()
        .map(|test| (test.nodeid.as_str(), test.runs, test.total_secs, test.average_secs))
        .collect();
    assert_eq!(
        tests,
        [
            (INDEX, 10, 100.0, 10.0),
            (REFUND, 13, 26.0, 2.0),
            (RANKING, 10, 20.0, 2.0),
        ],
    );
    assert_eq!(report.total_duration_secs, 166.0);
    assert_close(report.average_duration_secs, 166.0 / 53.0);
}

#[test]
fn error_patterns_group_by_exception() {
    let report = Insights::new(full_corpus()).tests().error_patterns();

    let patterns: Vec<(&str, usize, Vec<&str>)> = report
        .patterns
        .iter()
        .map(|pattern| {
            (
                pattern.pattern.as_str(),
                pattern.occurrences,
                pattern
                    .affected_tests
                    .iter()
                    .map(NodeId::as_str)
                    .collect(),
            )
        })
        .collect();
    assert_eq!(
        patterns,
        [
            (RANKING_PATTERN, 10, vec![RANKING]),
            (LOGIN_PATTERN, 5, vec![LOGIN]),
            (TAX_PATTERN, 2, vec![INVOICE_TAX]),
        ],
    );
    assert!(report.multi_error_tests.is_empty());
}

#[test]
fn seasonal_patterns_flag_the_shared_start_hour() {
    let report = Insights::new(api_history()).tests().seasonal_patterns();

    // Every failure lands at 10:00, which dominates the hourly bins; no
    // weekday stands far enough out of a daily schedule to peak.
    assert_eq!(
        report.tests,
        vec![
            SeasonalPattern {
                nodeid: NodeId::from(RANKING),
                failures: 10,
                peak_hours: vec![10],
                peak_days: Vec::new(),
            },
            SeasonalPattern {
                nodeid: NodeId::from(LOGIN),
                failures: 5,
                peak_hours: vec![10],
                peak_days: Vec::new(),
            },
        ],
    );
}

#[test]
fn dependency_graph_directs_the_co_failure() {
    let graph = Insights::new(api_history()).tests().dependency_graph();

    // test_login never fails without test_ranking failing, but not the
    // other way around.
    assert_eq!(
        graph.edges,
        vec![DependencyEdge {
            from: NodeId::from(LOGIN),
            to: NodeId::from(RANKING),
            strength: 1.0,
            directed: true,
        }],
    );
}

#[test]
fn constant_verdicts_produce_no_correlations() {
    let report = Insights::new(api_history()).tests().correlations();
    // Every test but test_login has a constant verdict, so no phi
    // coefficient is defined strongly enough to report.
    assert!(report.pairs.is_empty());
}

#[test]
fn health_score_report_exposes_its_components() {
    let report = Insights::new(api_history()).sessions().health_score();

    assert_close(report.score, 78.0);
    assert_eq!(report.pass_rate, 0.7);
    assert_eq!(report.flaky_ratio, 0.2);
    assert_eq!(report.duration_variance, 0.0);
    assert_eq!(report.consistently_failing_ratio, 0.2);
    assert_eq!(report.total_sessions, 10);
    assert_eq!(report.total_tests, 5);
}

#[test]
fn reliability_index_blends_consistency_measures() {
    let report = Insights::new(api_history()).sessions().reliability_index();

    assert_eq!(report.pass_rate, 0.7);
    assert_eq!(report.flaky_ratio, 0.2);
    // Four tests always produce the same verdict; test_login split 5/5.
    assert_eq!(report.test_consistency, 0.9);
    assert_close(report.environment_consistency, 1.0 / 1.004);
    assert_close(report.index, 28.0 + 24.0 + 15.0 / 1.004 + 13.5);
}

#[test]
fn environment_impact_groups_by_tag() {
    let impact = Insights::new(api_history()).sessions().environment_impact();

    let order: Vec<&str> = impact.environments.keys().map(String::as_str).collect();
    assert_eq!(order, ["ci", "staging"]);

    let ci = impact.environments["ci"];
    assert_eq!(ci.sessions, 5);
    assert_close(ci.average_pass_rate, 0.72);
    let staging = impact.environments["staging"];
    assert_eq!(staging.sessions, 5);
    assert_close(staging.average_pass_rate, 0.68);
    assert_close(impact.consistency, 1.0 / 1.004);
}

#[test]
fn failure_trend_tracks_the_regression() {
    let insights = Insights::new(api_history());
    let report = insights.trends().failure_trend();

    assert_eq!(report.error, None);
    assert_eq!(report.points.len(), 10);
    assert_eq!(
        report.points[0],
        TrendPoint {
            date: date(2026, 3, 2),
            value: 1.0,
        },
    );
    assert_eq!(report.points[9].value, 2.0);
    assert_eq!(report.change_percent, 100.0);
    assert_eq!(report.direction, TrendDirection::Declining);
}

#[test]
fn constant_session_durations_trend_stable() {
    let report = Insights::new(api_history()).trends().duration_trend();

    assert_eq!(report.error, None);
    assert!(report.points.iter().all(|point| point.value == 300.0));
    assert_eq!(report.change_percent, 0.0);
    assert_eq!(report.direction, TrendDirection::Stable);
}

#[test]
fn stability_timeline_windows_recent_dates() {
    let timeline = Insights::new(api_history()).trends().stability_timeline(2);

    assert_eq!(timeline.error, None);
    assert_eq!(timeline.dates, vec![date(2026, 3, 10), date(2026, 3, 11)]);
    assert_eq!(timeline.timeline.len(), 5);

    // One final outcome per test per date: perfectly self-consistent, even
    // for the tests that fail.
    let expected = TestTimeline {
        scores: btreemap! {
            date(2026, 3, 10) => 1.0,
            date(2026, 3, 11) => 1.0,
        },
        trend: TrendDirection::Stable,
    };
    for nodeid in [CHARGE, REFUND, INDEX, RANKING, LOGIN] {
        assert_eq!(timeline.timeline[&NodeId::from(nodeid)], expected, "{nodeid}");
    }
}

#[test]
fn comparing_halves_lists_the_regression() {
    let api = api_history();
    let report = Comparison::new(api[..5].to_vec(), api[5..].to_vec())
        .compare()
        .expect("both sides are non-empty");

    assert_eq!(
        report.base,
        SideSummary {
            sessions: 5,
            tests: 25,
            pass_rate: 0.8,
            average_duration_secs: 3.2,
        },
    );
    assert_eq!(
        report.target,
        SideSummary {
            sessions: 5,
            tests: 25,
            pass_rate: 0.6,
            average_duration_secs: 3.2,
        },
    );
    assert_close(report.pass_rate_delta, -0.2);
    assert_eq!(report.average_duration_delta_secs, 0.0);
    assert_eq!(report.new_failures, vec![NodeId::from(LOGIN)]);
    assert!(report.new_passes.is_empty());
}

#[test]
fn compare_suts_partitions_the_corpus() {
    let report = Comparison::compare_suts(&full_corpus(), API_SUT, BILLING_SUT)
        .expect("both SUTs have sessions");

    assert_eq!(
        report.base,
        SideSummary {
            sessions: 10,
            tests: 50,
            pass_rate: 0.7,
            average_duration_secs: 3.2,
        },
    );
    assert_eq!(
        report.target,
        SideSummary {
            sessions: 2,
            tests: 4,
            pass_rate: 0.5,
            average_duration_secs: 3.0,
        },
    );
    assert_close(report.pass_rate_delta, -0.2);
    assert_close(report.average_duration_delta_secs, -0.2);
    // The suites share no tests, so neither diff list has entries.
    assert!(report.new_failures.is_empty());
    assert!(report.new_passes.is_empty());
}
