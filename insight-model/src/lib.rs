// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data model for recorded pytest sessions.
//!
//! These types describe what a test-session producer (typically a pytest
//! plugin) records: a [`TestSession`] per suite execution, holding ordered
//! [`TestResult`]s and the [`RerunTestGroup`]s produced by retry plugins.
//! The types here are the wire format: they serialize to JSON with
//! kebab-case keys, durations as fractional seconds, and timestamps as
//! RFC 3339 strings.
//!
//! The aggregation and query layers live in the `insight-engine` crate;
//! this crate is deliberately small so that session producers don't pull in
//! the whole engine.
//!
//! # Counting rules
//!
//! `test_results` holds every execution attempt, including intermediate
//! attempts recorded with [`TestOutcome::Rerun`]. A *test*, for the purpose
//! of totals and pass rates, is a result whose outcome is not `Rerun`: the
//! final attempt carries the outcome of record. Rerun groups are an
//! alternate, grouped view of the same attempts and must never be counted
//! in addition to `test_results`.

mod errors;
mod node_id;
mod outcome;
mod rerun;
mod session;
mod test_result;

pub use errors::{ModelBuildError, OutcomeParseError};
pub use node_id::NodeId;
pub use outcome::{OutcomeCounts, TestOutcome};
pub use rerun::RerunTestGroup;
pub use session::{TestSession, TestSessionBuilder};
pub use test_result::{TestResult, TestResultBuilder};
