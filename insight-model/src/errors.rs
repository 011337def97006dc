// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while constructing or parsing model entities.

use crate::{node_id::NodeId, outcome::TestOutcome};
use thiserror::Error;

/// An error that occurs while parsing a [`TestOutcome`] from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized test outcome: {input}\n(known values: {})",
    TestOutcome::variants().join(", "),
)]
pub struct OutcomeParseError {
    input: String,
}

impl OutcomeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while constructing a model entity.
///
/// These are immediate, call-site errors: a [`TestResult`](crate::TestResult)
/// or [`TestSession`](crate::TestSession) with missing timing information, or
/// a [`RerunTestGroup`](crate::RerunTestGroup) fed a result for a different
/// test, is rejected before it ever enters a session.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ModelBuildError {
    /// A test result was built with neither a stop time nor a duration.
    #[error("test result for `{nodeid}` has neither a stop time nor a duration")]
    MissingTiming {
        /// The node ID of the offending result.
        nodeid: NodeId,
    },

    /// A session was built with neither a stop time nor a duration.
    #[error("session `{session_id}` has neither a stop time nor a duration")]
    MissingSessionTiming {
        /// The ID of the offending session.
        session_id: String,
    },

    /// A duration was out of the representable range.
    #[error("duration {seconds} seconds for `{context}` is not representable")]
    InvalidDuration {
        /// The node ID or session ID the duration belongs to.
        context: String,
        /// The offending value, in seconds.
        seconds: f64,
    },

    /// A result was added to a rerun group for a different test.
    #[error("cannot add result for `{actual}` to rerun group for `{expected}`")]
    NodeIdMismatch {
        /// The node ID the group was created for.
        expected: NodeId,
        /// The node ID of the result that was rejected.
        actual: NodeId,
    },

    /// A rerun group with no attempts was added to a session.
    #[error("rerun group for `{nodeid}` has no attempts")]
    EmptyRerunGroup {
        /// The node ID of the empty group.
        nodeid: NodeId,
    },
}
