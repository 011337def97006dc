// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forward-looking estimates built on top of an [`Analysis`] snapshot.
//!
//! All three estimators degrade gracefully: when the history is too thin
//! to extrapolate from, they return their report with `error` set and
//! whatever partial data exists, never an `Err`.

use crate::{
    analysis::Analysis,
    helpers,
    insights::{TrendDirection, TrendPoint},
    stats,
};
use chrono::{Days, NaiveDate};
use insight_model::{NodeId, OutcomeCounts, TestOutcome, TestSession};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum sessions before failure prediction will extrapolate.
const MIN_PREDICTION_SESSIONS: usize = 5;
/// Minimum per-test observations for prediction and anomaly detection.
const MIN_OBSERVATIONS: usize = 5;
/// Predicted failure probability above which a test is high-risk.
const HIGH_RISK_THRESHOLD: f64 = 0.7;
/// Anomaly score above which a test is reported.
const ANOMALY_THRESHOLD: f64 = 0.7;
/// Expected contamination: scores are scaled so that roughly the top 10%
/// of tests clear the anomaly threshold.
const CONTAMINATION_PERCENTILE: f64 = 0.9;
/// Daily stability points needed before forecasting.
const MIN_FORECAST_POINTS: usize = 7;
/// How many days ahead the stability forecast extends.
const FORECAST_HORIZON_DAYS: usize = 7;

/// Predictive estimators over a session history.
#[derive(Clone, Debug)]
pub struct PredictiveAnalytics {
    analysis: Analysis,
}

impl PredictiveAnalytics {
    /// Wraps an analysis snapshot.
    pub fn new(analysis: Analysis) -> Self {
        Self { analysis }
    }

    /// The underlying analysis.
    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Extrapolates each test's failure probability `days_ahead` days past
    /// the last session.
    ///
    /// Fits a least-squares line through (day offset, failed 0/1) final
    /// outcomes per test, then evaluates it at the horizon and clamps to
    /// `[0, 1]`. Needs at least 5 sessions, and per test at least 5
    /// observations with some spread in dates; tests predicted above 0.7
    /// are listed as high risk.
    pub fn failure_prediction(&self, days_ahead: u32) -> FailurePrediction {
        let insufficient = |error: String| FailurePrediction {
            error: Some(error),
            days_ahead,
            eligible_tests: 0,
            overall_failure_probability: 0.0,
            high_risk_tests: Vec::new(),
        };

        let sessions = helpers::sorted_by_start_time(self.analysis.sessions());
        if sessions.len() < MIN_PREDICTION_SESSIONS {
            return insufficient(format!(
                "need at least {MIN_PREDICTION_SESSIONS} sessions to predict, found {}",
                sessions.len()
            ));
        }

        let first_date = helpers::session_date(sessions[0]);
        let mut observations: BTreeMap<NodeId, Vec<(f64, f64)>> = BTreeMap::new();
        let mut horizon = 0.0f64;
        for session in &sessions {
            let offset = (helpers::session_date(session) - first_date).num_days() as f64;
            horizon = horizon.max(offset);
            for (nodeid, outcome) in session.final_outcomes() {
                observations
                    .entry(nodeid)
                    .or_default()
                    .push((offset, if outcome.is_failed() { 1.0 } else { 0.0 }));
            }
        }
        horizon += f64::from(days_ahead);

        let mut predictions: Vec<TestRisk> = Vec::new();
        for (nodeid, points) in observations {
            if points.len() < MIN_OBSERVATIONS {
                continue;
            }
            let Some(fit) = stats::linear_fit(&points) else {
                // All observations fell on one date.
                continue;
            };
            predictions.push(TestRisk {
                nodeid,
                probability: fit.predict(horizon).clamp(0.0, 1.0),
            });
        }

        if predictions.is_empty() {
            return insufficient(format!(
                "no test had {MIN_OBSERVATIONS} observations across more than one date"
            ));
        }

        let overall = stats::mean(
            &predictions
                .iter()
                .map(|risk| risk.probability)
                .collect::<Vec<_>>(),
        );
        let eligible_tests = predictions.len();
        let high_risk_tests = predictions
            .into_iter()
            .filter(|risk| risk.probability > HIGH_RISK_THRESHOLD)
            .sorted_by(|a, b| {
                b.probability
                    .total_cmp(&a.probability)
                    .then_with(|| a.nodeid.cmp(&b.nodeid))
            })
            .collect();

        FailurePrediction {
            error: None,
            days_ahead,
            eligible_tests,
            overall_failure_probability: overall,
            high_risk_tests,
        }
    }

    /// Flags tests whose behavior deviates from the rest of the suite.
    ///
    /// Each test with at least 5 recorded attempts gets a feature vector
    /// (mean duration, duration spread, failure rate, rerun rate, max/mean
    /// duration ratio). Features are z-score standardized across tests and
    /// a test's raw score is its mean absolute z. Raw scores are scaled so
    /// that only tests above the 90th percentile clear the 0.7 reporting
    /// threshold.
    pub fn anomaly_detection(&self) -> AnomalyReport {
        let features = self.test_features();
        if features.len() < 2 {
            return AnomalyReport {
                error: Some(format!(
                    "need at least 2 tests with {MIN_OBSERVATIONS} attempts, found {}",
                    features.len()
                )),
                tests_analyzed: features.len(),
                anomalies: Vec::new(),
            };
        }

        let columns: [Vec<f64>; 5] = [
            features.iter().map(|f| f.mean_duration_secs).collect(),
            features.iter().map(|f| f.std_duration_secs).collect(),
            features.iter().map(|f| f.failure_rate).collect(),
            features.iter().map(|f| f.rerun_rate).collect(),
            features.iter().map(|f| f.max_mean_ratio).collect(),
        ];
        let standardized: Vec<Vec<f64>> = columns.iter().map(|column| z_scores(column)).collect();

        let raw_scores: Vec<f64> = (0..features.len())
            .map(|row| {
                standardized
                    .iter()
                    .map(|column| column[row].abs())
                    .sum::<f64>()
                    / standardized.len() as f64
            })
            .collect();
        let mut sorted_scores = raw_scores.clone();
        sorted_scores.sort_by(f64::total_cmp);
        let cutoff = stats::percentile_sorted(&sorted_scores, CONTAMINATION_PERCENTILE);

        let tests_analyzed = features.len();
        let anomalies = features
            .into_iter()
            .zip(raw_scores)
            .map(|(feature, raw)| {
                let score = if cutoff > 0.0 {
                    (ANOMALY_THRESHOLD * raw / cutoff).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                TestAnomaly { score, ..feature }
            })
            .filter(|anomaly| anomaly.score > ANOMALY_THRESHOLD)
            .sorted_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.nodeid.cmp(&b.nodeid))
            })
            .collect();

        AnomalyReport {
            error: None,
            tests_analyzed,
            anomalies,
        }
    }

    /// Projects a daily stability score one week forward.
    ///
    /// The score for a date is `70 × pass rate + 30 × (1 − share of tests
    /// that needed rerun recovery)` over that date's sessions. A
    /// least-squares line through the daily series, evaluated over the
    /// next 7 days and clamped to `[0, 100]`, forms the forecast; the
    /// trend compares the final forecast value against today's score with
    /// a ±5 deadband. Needs at least 7 distinct dates.
    pub fn stability_forecast(&self) -> StabilityForecast {
        let mut by_date: BTreeMap<NaiveDate, Vec<&TestSession>> = BTreeMap::new();
        for session in self.analysis.sessions() {
            by_date
                .entry(helpers::session_date(session))
                .or_default()
                .push(session);
        }

        let daily_scores: Vec<TrendPoint> = by_date
            .iter()
            .map(|(&date, sessions)| TrendPoint {
                date,
                value: daily_stability_score(sessions),
            })
            .collect();
        let current_stability = daily_scores.last().map_or(0.0, |point| point.value);

        let insufficient = |error: String, daily_scores: Vec<TrendPoint>| StabilityForecast {
            error: Some(error),
            current_stability,
            daily_scores,
            forecast: Vec::new(),
            trend: TrendDirection::Stable,
        };

        if daily_scores.len() < MIN_FORECAST_POINTS {
            return insufficient(
                format!(
                    "need stability scores on at least {MIN_FORECAST_POINTS} distinct dates, \
                     found {}",
                    daily_scores.len()
                ),
                daily_scores,
            );
        }

        let series: Vec<(f64, f64)> = daily_scores
            .iter()
            .enumerate()
            .map(|(index, point)| (index as f64, point.value))
            .collect();
        let Some(fit) = stats::linear_fit(&series) else {
            // Unreachable with distinct indices, but stay total.
            return insufficient("degenerate daily series".to_owned(), daily_scores);
        };

        let last_index = daily_scores.len() - 1;
        let last_date = daily_scores[last_index].date;
        let forecast: Vec<ForecastPoint> = (1..=FORECAST_HORIZON_DAYS)
            .map(|step| ForecastPoint {
                date: last_date + Days::new(step as u64),
                predicted_score: fit
                    .predict((last_index + step) as f64)
                    .clamp(0.0, 100.0),
            })
            .collect();

        let endpoint = forecast[forecast.len() - 1].predicted_score;
        let trend = if endpoint - current_stability >= 5.0 {
            TrendDirection::Improving
        } else if endpoint - current_stability <= -5.0 {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };

        StabilityForecast {
            error: None,
            current_stability,
            daily_scores,
            forecast,
            trend,
        }
    }

    /// Per-test behavior features over tests with enough attempts, scores
    /// zeroed.
    fn test_features(&self) -> Vec<TestAnomaly> {
        struct Raw {
            durations: Vec<f64>,
            failed: usize,
            of_record: usize,
            reruns: usize,
            sessions_seen: usize,
        }

        let mut raw: BTreeMap<&NodeId, Raw> = BTreeMap::new();
        for session in self.analysis.sessions() {
            let mut seen: Vec<&NodeId> = Vec::new();
            for result in session.test_results() {
                let entry = raw.entry(result.nodeid()).or_insert_with(|| Raw {
                    durations: Vec::new(),
                    failed: 0,
                    of_record: 0,
                    reruns: 0,
                    sessions_seen: 0,
                });
                entry.durations.push(result.duration().as_secs_f64());
                match result.outcome() {
                    TestOutcome::Rerun => entry.reruns += 1,
                    outcome => {
                        entry.of_record += 1;
                        if outcome.is_failed() {
                            entry.failed += 1;
                        }
                    }
                }
                if !seen.contains(&result.nodeid()) {
                    seen.push(result.nodeid());
                }
            }
            for nodeid in seen {
                if let Some(entry) = raw.get_mut(nodeid) {
                    entry.sessions_seen += 1;
                }
            }
        }

        raw.into_iter()
            .filter(|(_, raw)| raw.durations.len() >= MIN_OBSERVATIONS)
            .map(|(nodeid, raw)| {
                let mean = stats::mean(&raw.durations);
                let max = raw.durations.iter().copied().fold(0.0f64, f64::max);
                TestAnomaly {
                    nodeid: nodeid.clone(),
                    score: 0.0,
                    mean_duration_secs: mean,
                    std_duration_secs: stats::std_dev(&raw.durations),
                    failure_rate: if raw.of_record == 0 {
                        0.0
                    } else {
                        raw.failed as f64 / raw.of_record as f64
                    },
                    rerun_rate: if raw.sessions_seen == 0 {
                        0.0
                    } else {
                        raw.reruns as f64 / raw.sessions_seen as f64
                    },
                    max_mean_ratio: if mean == 0.0 { 1.0 } else { max / mean },
                }
            })
            .collect()
    }
}

/// Stability score for one date's sessions.
fn daily_stability_score(sessions: &[&TestSession]) -> f64 {
    let counts = OutcomeCounts::from_outcomes(
        sessions
            .iter()
            .flat_map(|session| session.test_results())
            .map(|result| result.outcome()),
    );
    let recovered: usize = sessions
        .iter()
        .flat_map(|session| session.rerun_test_groups())
        .filter(|group| group.is_recovered())
        .count();
    let total = counts.total();
    let recovery_ratio = if total == 0 {
        0.0
    } else {
        recovered as f64 / total as f64
    };
    70.0 * counts.pass_rate() + 30.0 * (1.0 - recovery_ratio)
}

/// Z-scores for one feature column; a spreadless column scores zero.
fn z_scores(column: &[f64]) -> Vec<f64> {
    let mean = stats::mean(column);
    let std = stats::std_dev(column);
    column
        .iter()
        .map(|&value| if std == 0.0 { 0.0 } else { (value - mean) / std })
        .collect()
}

/// Extrapolated failure probabilities.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailurePrediction {
    /// Set when the history is too thin to extrapolate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The requested horizon in days past the last session.
    pub days_ahead: u32,

    /// Tests with enough observations to fit.
    pub eligible_tests: usize,

    /// Mean predicted probability over eligible tests.
    pub overall_failure_probability: f64,

    /// Tests predicted above 0.7, most likely first.
    pub high_risk_tests: Vec<TestRisk>,
}

/// One test's predicted failure probability.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestRisk {
    /// The test's nodeid.
    pub nodeid: NodeId,

    /// Predicted failure probability at the horizon, in `[0, 1]`.
    pub probability: f64,
}

/// Behavioral outliers across the suite.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnomalyReport {
    /// Set when fewer than 2 tests had enough attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Tests with enough attempts to score.
    pub tests_analyzed: usize,

    /// Tests scoring above 0.7, most anomalous first.
    pub anomalies: Vec<TestAnomaly>,
}

/// One test's anomaly score and the features behind it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestAnomaly {
    /// The test's nodeid.
    pub nodeid: NodeId,

    /// Scaled anomaly score in `[0, 1]`.
    pub score: f64,

    /// Mean attempt duration in seconds.
    pub mean_duration_secs: f64,

    /// Population standard deviation of attempt durations.
    pub std_duration_secs: f64,

    /// Failed results of record over results of record.
    pub failure_rate: f64,

    /// Rerun attempts per session containing the test.
    pub rerun_rate: f64,

    /// Longest attempt relative to the mean; 1.0 for a zero mean.
    pub max_mean_ratio: f64,
}

/// A projected stability trajectory.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StabilityForecast {
    /// Set when fewer than 7 daily scores exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The most recent daily score, 0 with no sessions.
    pub current_stability: f64,

    /// Observed daily scores, oldest first.
    pub daily_scores: Vec<TrendPoint>,

    /// Projected scores for the next 7 days.
    pub forecast: Vec<ForecastPoint>,

    /// Final forecast value against today's score, ±5 deadband.
    pub trend: TrendDirection,
}

/// One projected daily score.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForecastPoint {
    /// The projected date.
    pub date: NaiveDate,

    /// The projected stability score, in `[0, 100]`.
    pub predicted_score: f64,
}
