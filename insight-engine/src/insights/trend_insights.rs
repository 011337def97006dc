// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{helpers, stats};
use chrono::{Days, NaiveDate};
use insight_model::{NodeId, TestOutcome, TestSession};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Change below this magnitude (percent or stability delta scaled) is
/// reported as stable.
const TREND_DEADBAND_PERCENT: f64 = 5.0;
const STABILITY_DEADBAND: f64 = 0.1;

/// Time-bucketed insights over the session history.
///
/// Obtained from [`Insights::trends`](crate::insights::Insights::trends).
#[derive(Clone, Copy, Debug)]
pub struct TrendInsights<'a> {
    sessions: &'a [TestSession],
}

impl<'a> TrendInsights<'a> {
    pub(crate) fn new(sessions: &'a [TestSession]) -> Self {
        Self { sessions }
    }

    /// How mean session duration moves across calendar dates.
    ///
    /// Shorter sessions count as improvement. Fewer than 2 distinct dates
    /// produces a result with `error` set and whatever points exist.
    pub fn duration_trend(&self) -> TrendReport {
        self.trend_over_dates(|session| session.session_duration().as_secs_f64())
    }

    /// How the mean per-session failure count moves across calendar dates.
    ///
    /// Counts failures of record only; a falling series counts as
    /// improvement.
    pub fn failure_trend(&self) -> TrendReport {
        self.trend_over_dates(|session| session.outcome_counts().failed_of_record() as f64)
    }

    fn trend_over_dates(&self, metric: impl Fn(&TestSession) -> f64) -> TrendReport {
        let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for session in self.sessions {
            by_date
                .entry(helpers::session_date(session))
                .or_default()
                .push(metric(session));
        }
        let points: Vec<TrendPoint> = by_date
            .into_iter()
            .map(|(date, values)| TrendPoint {
                date,
                value: stats::mean(&values),
            })
            .collect();

        if points.len() < 2 {
            return TrendReport {
                error: Some(format!(
                    "need sessions on at least 2 distinct dates, found {}",
                    points.len()
                )),
                points,
                change_percent: 0.0,
                direction: TrendDirection::Stable,
            };
        }

        let first = points[0].value;
        let last = points[points.len() - 1].value;
        let change_percent = if first == 0.0 {
            last * 100.0
        } else {
            (last - first) / first * 100.0
        };
        // Both tracked metrics are costs, so a falling series improves.
        let direction = if change_percent.abs() < TREND_DEADBAND_PERCENT {
            TrendDirection::Stable
        } else if change_percent > 0.0 {
            TrendDirection::Declining
        } else {
            TrendDirection::Improving
        };

        TrendReport {
            error: None,
            points,
            change_percent,
            direction,
        }
    }

    /// Per-test stability scores across the last `days` calendar dates.
    ///
    /// The window is anchored at the most recent session date, so results
    /// do not depend on when the computation runs. A test's stability on a
    /// date is the share of that date's final outcomes matching the modal
    /// one; the per-test trend compares the first and last scores against a
    /// ±0.1 deadband. Fewer than 2 sessions or 2 distinct dates in the
    /// window produces a result with `error` set and the observed dates
    /// listed.
    pub fn stability_timeline(&self, days: u32) -> StabilityTimeline {
        let Some(anchor) = self
            .sessions
            .iter()
            .map(helpers::session_date)
            .max()
        else {
            return StabilityTimeline {
                error: Some("no sessions in scope".to_owned()),
                dates: Vec::new(),
                timeline: BTreeMap::new(),
            };
        };

        let cutoff = anchor - Days::new(u64::from(days));
        let in_window: Vec<&TestSession> = helpers::sorted_by_start_time(self.sessions)
            .into_iter()
            .filter(|session| helpers::session_date(session) > cutoff)
            .collect();
        let dates: Vec<NaiveDate> = in_window
            .iter()
            .map(|session| helpers::session_date(session))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if in_window.len() < 2 || dates.len() < 2 {
            return StabilityTimeline {
                error: Some(format!(
                    "need at least 2 sessions across 2 distinct dates in the window, \
                     found {} session(s) on {} date(s)",
                    in_window.len(),
                    dates.len()
                )),
                dates,
                timeline: BTreeMap::new(),
            };
        }

        let mut outcomes: BTreeMap<&NodeId, BTreeMap<NaiveDate, Vec<TestOutcome>>> =
            BTreeMap::new();
        let mut per_session: Vec<(NaiveDate, BTreeMap<NodeId, TestOutcome>)> = Vec::new();
        for session in &in_window {
            per_session.push((helpers::session_date(session), session.final_outcomes()));
        }
        for (date, finals) in &per_session {
            for (nodeid, outcome) in finals {
                outcomes
                    .entry(nodeid)
                    .or_default()
                    .entry(*date)
                    .or_default()
                    .push(*outcome);
            }
        }

        let timeline = outcomes
            .into_iter()
            .map(|(nodeid, by_date)| {
                let scores: BTreeMap<NaiveDate, f64> = by_date
                    .into_iter()
                    .map(|(date, day_outcomes)| (date, modal_share(&day_outcomes)))
                    .collect();
                let first = scores.values().next().copied().unwrap_or(0.0);
                let last = scores.values().next_back().copied().unwrap_or(0.0);
                let trend = if (last - first).abs() <= STABILITY_DEADBAND {
                    TrendDirection::Stable
                } else if last > first {
                    TrendDirection::Improving
                } else {
                    TrendDirection::Declining
                };
                (nodeid.clone(), TestTimeline { scores, trend })
            })
            .collect();

        StabilityTimeline {
            error: None,
            dates,
            timeline,
        }
    }
}

/// Share of outcomes matching the most common one.
fn modal_share(outcomes: &[TestOutcome]) -> f64 {
    let mut counts: BTreeMap<TestOutcome, usize> = BTreeMap::new();
    for outcome in outcomes {
        *counts.entry(*outcome).or_insert(0) += 1;
    }
    match counts.values().copied().max() {
        Some(modal) => modal as f64 / outcomes.len() as f64,
        None => 0.0,
    }
}

/// The direction a tracked metric is moving in.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendDirection {
    /// The metric is getting better.
    Improving,

    /// The metric is getting worse.
    Declining,

    /// The metric moved less than the deadband.
    Stable,
}

/// One dated value in a trend series.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrendPoint {
    /// The calendar date of the bucket.
    pub date: NaiveDate,

    /// The mean metric value over that date's sessions.
    pub value: f64,
}

/// A date-bucketed metric series with its overall movement.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrendReport {
    /// Set when the series is too short to classify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Per-date mean values, oldest first.
    pub points: Vec<TrendPoint>,

    /// Percentage change from the first point to the last.
    pub change_percent: f64,

    /// The classified movement.
    ///
    /// Both tracked metrics are costs, so a falling series reads as
    /// [`TrendDirection::Improving`] for durations and failures alike.
    pub direction: TrendDirection,
}

/// Per-test stability across a trailing date window.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StabilityTimeline {
    /// Set when the window holds too little data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Distinct dates observed in the window, oldest first.
    pub dates: Vec<NaiveDate>,

    /// Per-test dated stability scores.
    pub timeline: BTreeMap<NodeId, TestTimeline>,
}

/// The dated stability scores and movement for one test.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestTimeline {
    /// Stability score per date, in `[0, 1]`.
    pub scores: BTreeMap<NaiveDate, f64>,

    /// First-vs-last movement against a ±0.1 deadband.
    pub trend: TrendDirection,
}
