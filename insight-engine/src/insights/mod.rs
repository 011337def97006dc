// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prepackaged reports over a set of recorded sessions.
//!
//! [`Insights`] owns a snapshot of sessions and hands out three borrowing
//! views: [`tests()`](Insights::tests) for per-test structure (outcome
//! distributions, error patterns, co-failure graphs),
//! [`sessions()`](Insights::sessions) for whole-suite scores, and
//! [`trends()`](Insights::trends) for date-bucketed movement. Every report
//! is a plain serde-serializable struct, so rendering layers never need
//! engine types.
//!
//! Reports that need more history than they were given return a structured
//! result with `error` set rather than failing; see the individual view
//! methods.

mod session_insights;
mod test_insights;
mod trend_insights;

pub use session_insights::{
    EnvironmentImpact, EnvironmentStats, HealthScoreReport, ReliabilityIndexReport,
    SessionInsights,
};
pub use test_insights::{
    CorrelationReport, DependencyEdge, DependencyGraph, ErrorPattern, ErrorPatternReport,
    OutcomeDistribution, OutcomeShare, ReliabilityMetrics, SeasonalPattern,
    SeasonalPatternReport, SlowTest, SlowestTestsReport, TestCorrelation, TestInsights,
    UnreliableTest,
};
pub use trend_insights::{
    StabilityTimeline, TestTimeline, TrendDirection, TrendInsights, TrendPoint, TrendReport,
};

pub(crate) use session_insights::composite_health_score;

use insight_model::TestSession;

/// Entry point for the report suite: a snapshot of sessions plus the three
/// analysis views over it.
#[derive(Clone, Debug, Default)]
pub struct Insights {
    sessions: Vec<TestSession>,
}

impl Insights {
    /// Wraps a snapshot of sessions.
    pub fn new(sessions: Vec<TestSession>) -> Self {
        Self { sessions }
    }

    /// The sessions in scope.
    pub fn session_data(&self) -> &[TestSession] {
        &self.sessions
    }

    /// Test-scoped reports: distributions, reliability, error mining, and
    /// co-failure structure.
    pub fn tests(&self) -> TestInsights<'_> {
        TestInsights::new(&self.sessions)
    }

    /// Session-scoped reports: health, reliability index, and environment
    /// impact.
    pub fn sessions(&self) -> SessionInsights<'_> {
        SessionInsights::new(&self.sessions)
    }

    /// Date-bucketed reports: duration and failure trends, stability
    /// timeline.
    pub fn trends(&self) -> TrendInsights<'_> {
        TrendInsights::new(&self.sessions)
    }
}
