// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Predictive scenarios: failure extrapolation, anomaly scoring, and the
//! stability forecast over the corpus.

use crate::fixtures::*;
use insight_engine::{
    analysis::Analysis,
    insights::TrendDirection,
    predict::{PredictiveAnalytics, TestRisk},
};
use insight_model::NodeId;
use pretty_assertions::assert_eq;

fn api_predictor() -> PredictiveAnalytics {
    PredictiveAnalytics::new(Analysis::new(api_history()))
}

#[test]
fn failure_prediction_extrapolates_the_regression() {
    let prediction = api_predictor().failure_prediction(7);

    assert_eq!(prediction.error, None);
    assert_eq!(prediction.days_ahead, 7);
    assert_eq!(prediction.eligible_tests, 5);
    // Three tests project to 0 and two to 1.
    assert_eq!(prediction.overall_failure_probability, 0.4);
    // test_login's fitted line crosses 1 before the horizon and clamps;
    // the tie with the constant failer breaks by nodeid.
    assert_eq!(
        prediction.high_risk_tests,
        vec![
            TestRisk {
                nodeid: NodeId::from(LOGIN),
                probability: 1.0,
            },
            TestRisk {
                nodeid: NodeId::from(RANKING),
                probability: 1.0,
            },
        ],
    );
}

#[test]
fn uniform_small_suite_yields_no_anomalies() {
    let report = api_predictor().anomaly_detection();

    assert_eq!(report.error, None);
    assert_eq!(report.tests_analyzed, 5);
    // With five tests the contamination cutoff lands on the top raw score,
    // pinning the maximum scaled score at exactly the reporting threshold;
    // reporting requires strictly above it.
    assert!(report.anomalies.is_empty());
}

#[test]
fn stability_forecast_projects_the_decline() {
    let forecast = api_predictor().stability_forecast();

    assert_eq!(forecast.error, None);
    assert_eq!(forecast.daily_scores.len(), 10);
    assert_eq!(forecast.daily_scores[0].date, date(2026, 3, 2));
    assert_eq!(forecast.daily_scores[9].date, date(2026, 3, 11));
    // 70 * pass rate + 30 * (1 - rerun recovery share): 86 on clean
    // passing days, 80 and 66 on rerun days, 72 after the regression.
    let expected = [86.0, 80.0, 86.0, 86.0, 80.0, 72.0, 72.0, 66.0, 72.0, 72.0];
    for (point, expected) in forecast.daily_scores.iter().zip(expected) {
        assert_close(point.value, expected);
    }
    assert_close(forecast.current_stability, 72.0);

    assert_eq!(forecast.forecast.len(), 7);
    assert_eq!(forecast.forecast[0].date, date(2026, 3, 12));
    assert_eq!(forecast.forecast[6].date, date(2026, 3, 18));
    // Least squares through the dailies: slope -166/82.5 per day.
    assert_close(forecast.forecast[0].predicted_score, 66.13333333333333);
    assert_close(forecast.forecast[6].predicted_score, 54.06060606060606);
    assert_eq!(forecast.trend, TrendDirection::Declining);
}

#[test]
fn thin_histories_degrade_to_structured_errors() {
    let billing = Analysis::new(full_corpus())
        .with_query(|query| query.for_sut(BILLING_SUT))
        .expect("query builds");
    assert_eq!(billing.sessions().len(), 2);
    let predictor = PredictiveAnalytics::new(billing);

    let prediction = predictor.failure_prediction(7);
    assert!(prediction.error.is_some());
    assert_eq!(prediction.eligible_tests, 0);
    assert_eq!(prediction.overall_failure_probability, 0.0);
    assert!(prediction.high_risk_tests.is_empty());

    let forecast = predictor.stability_forecast();
    assert!(forecast.error.is_some());
    assert_eq!(forecast.daily_scores.len(), 2);
    assert!(forecast.forecast.is_empty());
    // One of two billing tests passes, and nothing needed a rerun.
    assert_close(forecast.current_stability, 65.0);
}
