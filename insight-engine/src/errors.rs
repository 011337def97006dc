// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the engine.

use crate::store::SessionsJsonFormatVersion;
use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// An error that occurs while building a query.
///
/// Builder methods stay fluent and never fail; the first offending parameter
/// is remembered, and `execute` or `to_spec` returns it before any session
/// is scanned.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum QueryBuildError {
    /// A SUT filter was given an empty name.
    #[error("SUT name must not be empty")]
    EmptySutName,

    /// A tag filter was given an empty key.
    #[error("tag key must not be empty")]
    EmptyTagKey,

    /// A tag-set filter was given no pairs.
    #[error("tag set must contain at least one key-value pair")]
    EmptyTagSet,

    /// A text filter was given an empty pattern.
    #[error("{context} pattern must not be empty")]
    EmptyPattern {
        /// Which filter the pattern was for.
        context: &'static str,
    },

    /// A glob pattern failed to compile.
    #[error("invalid glob pattern `{pattern}`")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// A duration range was negative or inverted.
    #[error("invalid duration range: min {min} max {max} (seconds)")]
    InvalidDurationRange {
        /// The lower bound that was requested.
        min: f64,

        /// The upper bound that was requested.
        max: f64,
    },

    /// A relative time window of zero days was requested.
    #[error("day window must be at least 1 day")]
    ZeroDays,

    /// A time range ends before it starts.
    #[error("time range starts at {start} but ends at {end}")]
    InvertedTimeRange {
        /// The requested start of the range.
        start: DateTime<FixedOffset>,

        /// The requested end of the range.
        end: DateTime<FixedOffset>,
    },

    /// A custom predicate was registered with an empty name.
    #[error("custom predicate name must not be empty")]
    EmptyPredicateName,

    /// A stored query names a custom predicate that isn't registered.
    #[error(
        "unknown custom predicate `{name}`\n\
         (hint: rebuild with a registry that provides it)"
    )]
    UnknownPredicate {
        /// The name the stored query refers to.
        name: String,
    },
}

/// An error that occurs during cross-session analysis.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum AnalysisError {
    /// A health comparison was requested but neither side has any sessions.
    #[error("no sessions on either side of the comparison")]
    NoSessions,
}

/// An error that occurs while comparing two session sets.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum CompareError {
    /// Both the base and target sides are empty.
    #[error("no sessions in either the base or target set")]
    NoSessions,
}

/// An error that occurs while loading or saving sessions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// An error occurred while creating the store directory.
    #[error("error creating store directory `{path}`")]
    DirCreate {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while opening or locking the lock file.
    #[error("error locking `{path}`")]
    FileLock {
        /// The lock file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The lock could not be acquired within the configured timeout.
    #[error("timed out after {timeout_secs}s waiting for lock on `{path}`")]
    FileLockTimeout {
        /// The lock file path.
        path: Utf8PathBuf,

        /// The timeout that expired, in seconds.
        timeout_secs: u64,
    },

    /// An error occurred while reading the sessions file.
    #[error("error reading sessions from `{path}`")]
    FileRead {
        /// The sessions file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The header line of the sessions file could not be parsed.
    #[error("error parsing header of `{path}`")]
    HeaderDeserialize {
        /// The sessions file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A session line could not be parsed.
    #[error("error parsing session on line {line} of `{path}`")]
    SessionDeserialize {
        /// The sessions file path.
        path: Utf8PathBuf,

        /// The 1-based line number of the corrupt record.
        line: usize,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The file was written by a newer version of this crate; writing to it
    /// would lose data it may contain.
    #[error(
        "`{path}` uses sessions format version {file_version}, but this \
         version supports up to {supported_version}; refusing to write"
    )]
    FormatVersionTooNew {
        /// The sessions file path.
        path: Utf8PathBuf,

        /// The version recorded in the file.
        file_version: SessionsJsonFormatVersion,

        /// The newest version this crate can write.
        supported_version: SessionsJsonFormatVersion,
    },

    /// A session failed to serialize.
    #[error("error serializing session `{session_id}`")]
    SessionSerialize {
        /// The ID of the session that failed to serialize.
        session_id: String,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// An error occurred while writing the sessions file.
    #[error("error writing sessions to `{path}`")]
    FileWrite {
        /// The sessions file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },

    /// A stored query spec could not be turned back into a query.
    #[error("invalid stored query")]
    Query(#[source] QueryBuildError),
}
