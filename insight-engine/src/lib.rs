// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Storage, querying and analytics for recorded pytest sessions.
//!
//! This crate is the read side of test-insight: it loads the
//! [`TestSession`](insight_model::TestSession) records a session producer
//! wrote, filters them with [`query::Query`], and computes aggregate
//! analytics over the result.
//!
//! The main entry points are:
//!
//! * [`store::JsonStore`], a file-backed [`store::SessionStore`] holding one
//!   session per line;
//! * [`query::Query`], a composable session filter with a serializable
//!   [`query::QuerySpec`] form;
//! * [`analysis::Analysis`], aggregate metrics over a set of sessions;
//! * [`insights::Insights`], grouped per-test, per-session and trend views;
//! * [`predict::PredictiveAnalytics`], failure prediction, anomaly detection
//!   and stability forecasting;
//! * [`compare::Comparison`], side-by-side comparison of two session sets.
//!
//! Analytics are computed over in-memory snapshots: load once, then slice
//! the same `Vec<TestSession>` as many ways as needed.

pub mod analysis;
pub mod compare;
pub mod errors;
mod helpers;
pub mod insights;
pub mod predict;
pub mod query;
mod stats;
pub mod store;
