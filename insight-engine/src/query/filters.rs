// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, FixedOffset, TimeDelta};
use debug_ignore::DebugIgnore;
use globset::{Glob, GlobMatcher};
use insight_model::{TestOutcome, TestResult, TestSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A text field of a [`TestResult`] that glob filters can match against.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestField {
    /// The test's node ID.
    Nodeid,

    /// Captured log output.
    Caplog,

    /// Captured standard output.
    Capstdout,

    /// Captured standard error.
    Capstderr,

    /// The failure representation text.
    Longreprtext,
}

impl TestField {
    /// Extracts this field's text from a result.
    ///
    /// Optional fields that were not captured yield `None`, and a glob never
    /// matches an absent field.
    pub(crate) fn extract<'a>(self, result: &'a TestResult) -> Option<&'a str> {
        match self {
            TestField::Nodeid => Some(result.nodeid().as_str()),
            TestField::Caplog => result.caplog(),
            TestField::Capstdout => result.capstdout(),
            TestField::Capstderr => result.capstderr(),
            TestField::Longreprtext => result.longreprtext(),
        }
    }
}

/// A whole-session admit/reject rule.
///
/// Session filters never alter a session's contents: a session either passes
/// through intact or is skipped.
#[derive(Clone, Debug)]
pub(crate) enum SessionFilter {
    /// SUT name equality.
    Sut(String),

    /// Tag equality. Multiple tag filters AND together.
    Tag { key: String, value: String },

    /// At least one of the given tag pairs matches.
    TagsAny(Vec<(String, String)>),

    /// Session started within the last N days of the query's `now`.
    InLastDays(u32),

    /// Session started strictly before the timestamp.
    Before(DateTime<FixedOffset>),

    /// Session started strictly after the timestamp.
    After(DateTime<FixedOffset>),

    /// Session started within the inclusive range.
    Between {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },

    /// Session ID matches a glob pattern.
    SessionIdMatches { glob: Glob, matcher: GlobMatcher },
}

impl SessionFilter {
    pub(crate) fn admits(&self, session: &TestSession, now: DateTime<FixedOffset>) -> bool {
        let start_time = session.session_start_time();
        match self {
            SessionFilter::Sut(name) => session.sut_name() == name,
            SessionFilter::Tag { key, value } => session.tag(key) == Some(value.as_str()),
            SessionFilter::TagsAny(pairs) => pairs
                .iter()
                .any(|(key, value)| session.tag(key) == Some(value.as_str())),
            SessionFilter::InLastDays(days) => {
                start_time >= now - TimeDelta::days(i64::from(*days))
            }
            SessionFilter::Before(timestamp) => start_time < *timestamp,
            SessionFilter::After(timestamp) => start_time > *timestamp,
            SessionFilter::Between { start, end } => start_time >= *start && start_time <= *end,
            SessionFilter::SessionIdMatches { matcher, .. } => {
                matcher.is_match(session.session_id())
            }
        }
    }
}

/// An arbitrary test predicate supplied by the caller.
pub(crate) type PredicateFn = Arc<dyn Fn(&TestResult) -> bool + Send + Sync>;

/// A per-result keep/drop rule.
///
/// All test predicates on a query AND together; a session survives
/// test-level filtering iff at least one of its results matches every
/// predicate.
#[derive(Clone, Debug)]
pub(crate) enum TestPredicate {
    /// Outcome equality.
    Outcome(TestOutcome),

    /// Node ID contains the substring (case-sensitive).
    NodeidContains(String),

    /// A text field matches a glob pattern.
    FieldMatches {
        field: TestField,
        glob: Glob,
        matcher: GlobMatcher,
    },

    /// Duration in seconds within the inclusive range.
    DurationBetween { min_secs: f64, max_secs: f64 },

    /// The result raised warnings.
    HasWarning,

    /// A named caller-supplied predicate.
    Custom {
        name: String,
        predicate: DebugIgnore<PredicateFn>,
    },
}

impl TestPredicate {
    pub(crate) fn matches(&self, result: &TestResult) -> bool {
        match self {
            TestPredicate::Outcome(outcome) => result.outcome() == *outcome,
            TestPredicate::NodeidContains(substring) => {
                result.nodeid().as_str().contains(substring)
            }
            TestPredicate::FieldMatches { field, matcher, .. } => field
                .extract(result)
                .is_some_and(|text| matcher.is_match(text)),
            TestPredicate::DurationBetween { min_secs, max_secs } => {
                let secs = result.duration().as_secs_f64();
                secs >= *min_secs && secs <= *max_secs
            }
            TestPredicate::HasWarning => result.has_warning(),
            TestPredicate::Custom { predicate, .. } => (predicate.0)(result),
        }
    }
}
