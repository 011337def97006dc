// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These scenarios exercise the crate end to end over a fixed corpus built
//! by [`fixtures`]: ten daily `api-service` sessions with a known mix of
//! stable, slow, flaky and regressing tests, plus two `billing-service`
//! sessions for cross-SUT scenarios. Every expected number asserted here
//! is derived by hand from that corpus, so a failure points at a behavior
//! change rather than at drifting test data.
//!
//! The scenarios are grouped by surface:
//!
//! - `store`: JSONL persistence, locking and format versioning
//! - `queries`: session and test filters, specs and registries
//! - `reports`: analysis, insight and comparison reports
//! - `prediction`: trends, forecasts and anomaly scoring

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use insight_engine::{
    analysis::Analysis,
    insights::TrendDirection,
    predict::PredictiveAnalytics,
    store::{JsonStore, SessionStore, StoreConfig},
};

mod fixtures;
mod prediction;
mod queries;
mod reports;
mod store;

/// Records the corpus through the store, then runs the analytics stack on
/// top of what was persisted.
#[test]
fn recorded_corpus_drives_the_full_analytics_stack() {
    let dir = Utf8TempDir::new().expect("temp dir created");
    let store = JsonStore::new(StoreConfig::new(dir.path().join("sessions.json")));
    for session in full_corpus() {
        store.save_session(&session).expect("session saves");
    }

    let analysis = Analysis::from_store(&store).expect("store loads");
    assert_eq!(analysis.sessions().len(), 12);

    let api = analysis
        .with_query(|query| query.for_sut(API_SUT))
        .expect("query builds");
    assert_eq!(api.sessions().len(), 10);
    let health = api.health_report();
    assert_eq!(health.total_tests, 50);
    assert!((health.health_score - 78.0).abs() < 1e-9);

    let predictive = PredictiveAnalytics::new(api);
    let forecast = predictive.stability_forecast();
    assert_eq!(forecast.error, None);
    assert_eq!(forecast.trend, TrendDirection::Declining);
}
