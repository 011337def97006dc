// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two-level query engine over recorded sessions.
//!
//! Queries are built fluently, then executed against a slice of sessions:
//!
//! ```
//! use insight_engine::query::Query;
//! use insight_model::TestOutcome;
//!
//! # fn example(sessions: &[insight_model::TestSession]) -> Result<(), insight_engine::errors::QueryBuildError> {
//! let result = Query::new()
//!     .for_sut("api-service")
//!     .in_last_days(30)
//!     .filter_by_test()
//!     .with_outcome(TestOutcome::Failed)
//!     .apply()
//!     .execute(sessions)?;
//! # Ok(()) }
//! ```
//!
//! Filtering happens at two levels. Session-level filters admit or reject
//! whole sessions. Test-level filters, entered through
//! [`Query::filter_by_test`], keep a session only if at least one of its
//! results matches every predicate, and narrow the kept session to the
//! matching results while preserving its identity, tags, timestamps, and
//! the rerun groups of surviving tests. Session context is never discarded:
//! "failed logins on staging" still tells you which sessions the failures
//! happened in.
//!
//! Builder methods never fail. An invalid parameter (empty SUT name, an
//! inverted duration range) is remembered, and [`Query::execute`] or
//! [`Query::to_spec`] reports the first one before scanning any session.

mod filters;
mod spec;

pub use filters::TestField;
pub use spec::{PredicateRegistry, QuerySpec, SessionFilterSpec, TagPair, TestPredicateSpec};

use crate::errors::QueryBuildError;
use chrono::{DateTime, FixedOffset, Local};
use debug_ignore::DebugIgnore;
use filters::{PredicateFn, SessionFilter, TestPredicate};
use globset::Glob;
use insight_model::{TestOutcome, TestResult, TestSession};
use std::sync::Arc;

/// A fluent query over recorded sessions.
///
/// See the [module docs](self) for an overview.
#[derive(Clone, Debug, Default)]
pub struct Query {
    session_filters: Vec<SessionFilter>,
    test_filters: Vec<TestPredicate>,
    error: Option<QueryBuildError>,
}

impl Query {
    /// Creates a query that matches every session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps sessions whose SUT name equals `name`.
    pub fn for_sut(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            return self.record_error(QueryBuildError::EmptySutName);
        }
        self.session_filters.push(SessionFilter::Sut(name));
        self
    }

    /// Keeps sessions carrying the given tag. Multiple calls AND together.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key.is_empty() {
            return self.record_error(QueryBuildError::EmptyTagKey);
        }
        self.session_filters.push(SessionFilter::Tag {
            key,
            value: value.into(),
        });
        self
    }

    /// Keeps sessions carrying at least one of the given tags.
    pub fn with_tags_any<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        if pairs.is_empty() {
            return self.record_error(QueryBuildError::EmptyTagSet);
        }
        if pairs.iter().any(|(key, _)| key.is_empty()) {
            return self.record_error(QueryBuildError::EmptyTagKey);
        }
        self.session_filters.push(SessionFilter::TagsAny(pairs));
        self
    }

    /// Keeps sessions that started within the last `days` days.
    ///
    /// The window is measured from the execution time: [`Query::execute`]
    /// uses the current local time, [`Query::execute_at`] uses the time it
    /// is given.
    pub fn in_last_days(mut self, days: u32) -> Self {
        if days == 0 {
            return self.record_error(QueryBuildError::ZeroDays);
        }
        self.session_filters.push(SessionFilter::InLastDays(days));
        self
    }

    /// Keeps sessions that started strictly before `timestamp`.
    pub fn before(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.session_filters.push(SessionFilter::Before(timestamp));
        self
    }

    /// Keeps sessions that started strictly after `timestamp`.
    pub fn after(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.session_filters.push(SessionFilter::After(timestamp));
        self
    }

    /// Keeps sessions that started within the inclusive range.
    pub fn between(mut self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        if start > end {
            return self.record_error(QueryBuildError::InvertedTimeRange { start, end });
        }
        self.session_filters.push(SessionFilter::Between { start, end });
        self
    }

    /// Keeps sessions whose ID matches a glob pattern.
    pub fn session_id_matches(mut self, pattern: &str) -> Self {
        if pattern.is_empty() {
            return self.record_error(QueryBuildError::EmptyPattern {
                context: "session ID",
            });
        }
        match Glob::new(pattern) {
            Ok(glob) => {
                let matcher = glob.compile_matcher();
                self.session_filters
                    .push(SessionFilter::SessionIdMatches { glob, matcher });
                self
            }
            Err(error) => self.record_error(QueryBuildError::InvalidPattern {
                pattern: pattern.to_owned(),
                error,
            }),
        }
    }

    /// Enters the test-level sub-builder.
    ///
    /// Predicates added there AND together and take effect when the
    /// sub-builder is closed with [`TestFilterBuilder::apply`].
    pub fn filter_by_test(self) -> TestFilterBuilder {
        TestFilterBuilder {
            query: self,
            predicates: Vec::new(),
        }
    }

    /// Runs the query, using the current local time for relative filters.
    pub fn execute(&self, sessions: &[TestSession]) -> Result<QueryResult, QueryBuildError> {
        self.execute_at(sessions, Local::now().fixed_offset())
    }

    /// Runs the query with an explicit "now".
    ///
    /// Relative filters such as [`Query::in_last_days`] resolve against
    /// `now`, which makes results reproducible in tests and replays.
    pub fn execute_at(
        &self,
        sessions: &[TestSession],
        now: DateTime<FixedOffset>,
    ) -> Result<QueryResult, QueryBuildError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let mut selected = Vec::new();
        for session in sessions {
            if !self
                .session_filters
                .iter()
                .all(|filter| filter.admits(session, now))
            {
                continue;
            }
            if self.test_filters.is_empty() {
                selected.push(session.clone());
                continue;
            }
            let matching: Vec<TestResult> = session
                .test_results()
                .iter()
                .filter(|result| {
                    self.test_filters
                        .iter()
                        .all(|predicate| predicate.matches(result))
                })
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }
            selected.push(session.with_test_results(matching));
        }
        Ok(QueryResult { sessions: selected })
    }

    /// Serializes this query's filter configuration.
    ///
    /// Fails with the first recorded parameter error, like
    /// [`Query::execute`] does.
    pub fn to_spec(&self) -> Result<QuerySpec, QueryBuildError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let session_filters = self
            .session_filters
            .iter()
            .map(|filter| match filter {
                SessionFilter::Sut(name) => SessionFilterSpec::Sut { name: name.clone() },
                SessionFilter::Tag { key, value } => SessionFilterSpec::Tag {
                    key: key.clone(),
                    value: value.clone(),
                },
                SessionFilter::TagsAny(pairs) => SessionFilterSpec::TagsAny {
                    pairs: pairs
                        .iter()
                        .map(|(key, value)| TagPair {
                            key: key.clone(),
                            value: value.clone(),
                        })
                        .collect(),
                },
                SessionFilter::InLastDays(days) => SessionFilterSpec::InLastDays { days: *days },
                SessionFilter::Before(timestamp) => SessionFilterSpec::Before {
                    timestamp: *timestamp,
                },
                SessionFilter::After(timestamp) => SessionFilterSpec::After {
                    timestamp: *timestamp,
                },
                SessionFilter::Between { start, end } => SessionFilterSpec::Between {
                    start: *start,
                    end: *end,
                },
                SessionFilter::SessionIdMatches { glob, .. } => {
                    SessionFilterSpec::SessionIdMatches {
                        pattern: glob.glob().to_owned(),
                    }
                }
            })
            .collect();

        let test_filters = self
            .test_filters
            .iter()
            .map(|predicate| match predicate {
                TestPredicate::Outcome(outcome) => TestPredicateSpec::Outcome {
                    outcome: *outcome,
                },
                TestPredicate::NodeidContains(substring) => TestPredicateSpec::NodeidContains {
                    substring: substring.clone(),
                },
                TestPredicate::FieldMatches { field, glob, .. } => {
                    TestPredicateSpec::FieldMatches {
                        field: *field,
                        pattern: glob.glob().to_owned(),
                    }
                }
                TestPredicate::DurationBetween { min_secs, max_secs } => {
                    TestPredicateSpec::DurationBetween {
                        min_secs: *min_secs,
                        max_secs: *max_secs,
                    }
                }
                TestPredicate::HasWarning => TestPredicateSpec::HasWarning,
                TestPredicate::Custom { name, .. } => {
                    TestPredicateSpec::Custom { name: name.clone() }
                }
            })
            .collect();

        Ok(QuerySpec {
            session_filters,
            test_filters,
        })
    }

    /// Rebuilds a query from a spec containing no custom predicates.
    ///
    /// Fails with [`QueryBuildError::UnknownPredicate`] if the spec names
    /// one; use [`Query::from_spec_with_predicates`] to supply the
    /// functions.
    pub fn from_spec(spec: &QuerySpec) -> Result<Self, QueryBuildError> {
        Self::from_spec_with_predicates(spec, &PredicateRegistry::new())
    }

    /// Rebuilds a query from a spec, resolving custom predicates by name
    /// through `registry`.
    pub fn from_spec_with_predicates(
        spec: &QuerySpec,
        registry: &PredicateRegistry,
    ) -> Result<Self, QueryBuildError> {
        let mut query = Query::new();
        for filter in &spec.session_filters {
            query = match filter {
                SessionFilterSpec::Sut { name } => query.for_sut(name),
                SessionFilterSpec::Tag { key, value } => query.with_tag(key, value),
                SessionFilterSpec::TagsAny { pairs } => query.with_tags_any(
                    pairs
                        .iter()
                        .map(|pair| (pair.key.as_str(), pair.value.as_str())),
                ),
                SessionFilterSpec::InLastDays { days } => query.in_last_days(*days),
                SessionFilterSpec::Before { timestamp } => query.before(*timestamp),
                SessionFilterSpec::After { timestamp } => query.after(*timestamp),
                SessionFilterSpec::Between { start, end } => query.between(*start, *end),
                SessionFilterSpec::SessionIdMatches { pattern } => {
                    query.session_id_matches(pattern)
                }
            };
        }

        if !spec.test_filters.is_empty() {
            let mut tests = query.filter_by_test();
            for predicate in &spec.test_filters {
                tests = match predicate {
                    TestPredicateSpec::Outcome { outcome } => tests.with_outcome(*outcome),
                    TestPredicateSpec::NodeidContains { substring } => {
                        tests.nodeid_contains(substring)
                    }
                    TestPredicateSpec::FieldMatches { field, pattern } => {
                        tests.field_matches(*field, pattern)
                    }
                    TestPredicateSpec::DurationBetween { min_secs, max_secs } => {
                        tests.duration_between(*min_secs, *max_secs)
                    }
                    TestPredicateSpec::HasWarning => tests.with_warning(),
                    TestPredicateSpec::Custom { name } => match registry.get(name) {
                        Some(predicate) => tests.custom_fn(name.clone(), predicate.clone()),
                        None => {
                            return Err(QueryBuildError::UnknownPredicate { name: name.clone() });
                        }
                    },
                };
            }
            query = tests.apply();
        }

        // Replaying the builder re-runs parameter validation; surface the
        // verdict immediately rather than deferring to execute().
        match query.error {
            Some(error) => Err(error),
            None => Ok(query),
        }
    }

    fn record_error(mut self, error: QueryBuildError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}

/// Builder for the test-level predicates of a [`Query`].
///
/// Created by [`Query::filter_by_test`]; closed with
/// [`TestFilterBuilder::apply`], which returns the parent query.
#[derive(Clone, Debug)]
pub struct TestFilterBuilder {
    query: Query,
    predicates: Vec<TestPredicate>,
}

impl TestFilterBuilder {
    /// Keeps results with the given outcome.
    pub fn with_outcome(mut self, outcome: TestOutcome) -> Self {
        self.predicates.push(TestPredicate::Outcome(outcome));
        self
    }

    /// Keeps results whose node ID contains `substring` (case-sensitive).
    pub fn nodeid_contains(mut self, substring: impl Into<String>) -> Self {
        let substring = substring.into();
        if substring.is_empty() {
            self.query = self.query.record_error(QueryBuildError::EmptyPattern {
                context: "nodeid",
            });
            return self;
        }
        self.predicates.push(TestPredicate::NodeidContains(substring));
        self
    }

    /// Keeps results whose `field` matches a glob pattern.
    ///
    /// A result where the field was never captured does not match.
    pub fn field_matches(mut self, field: TestField, pattern: &str) -> Self {
        if pattern.is_empty() {
            self.query = self.query.record_error(QueryBuildError::EmptyPattern {
                context: "field",
            });
            return self;
        }
        match Glob::new(pattern) {
            Ok(glob) => {
                let matcher = glob.compile_matcher();
                self.predicates.push(TestPredicate::FieldMatches {
                    field,
                    glob,
                    matcher,
                });
            }
            Err(error) => {
                self.query = self.query.record_error(QueryBuildError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    error,
                });
            }
        }
        self
    }

    /// Keeps results whose duration lies within the inclusive range, in
    /// seconds.
    pub fn duration_between(mut self, min_secs: f64, max_secs: f64) -> Self {
        let valid = min_secs >= 0.0 && max_secs >= 0.0 && min_secs <= max_secs;
        if !valid {
            self.query = self
                .query
                .record_error(QueryBuildError::InvalidDurationRange {
                    min: min_secs,
                    max: max_secs,
                });
            return self;
        }
        self.predicates
            .push(TestPredicate::DurationBetween { min_secs, max_secs });
        self
    }

    /// Keeps results that raised warnings.
    pub fn with_warning(mut self) -> Self {
        self.predicates.push(TestPredicate::HasWarning);
        self
    }

    /// Keeps results matching a named caller-supplied predicate.
    ///
    /// The name is what serializes into a [`QuerySpec`]; pick one that a
    /// [`PredicateRegistry`] can resolve when the spec is rebuilt.
    pub fn custom(
        self,
        name: impl Into<String>,
        predicate: impl Fn(&TestResult) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.custom_fn(name.into(), Arc::new(predicate))
    }

    fn custom_fn(mut self, name: String, predicate: PredicateFn) -> Self {
        if name.is_empty() {
            self.query = self
                .query
                .record_error(QueryBuildError::EmptyPredicateName);
            return self;
        }
        self.predicates.push(TestPredicate::Custom {
            name,
            predicate: DebugIgnore(predicate),
        });
        self
    }

    /// Closes the sub-builder, attaching its predicates to the query.
    pub fn apply(mut self) -> Query {
        self.query.test_filters.append(&mut self.predicates);
        self.query
    }
}

/// The sessions a query selected.
///
/// Sessions appear in their input order. When test-level filters were
/// applied, each session is a narrowed copy containing only the matching
/// results; see the [module docs](self).
#[derive(Clone, Debug)]
pub struct QueryResult {
    sessions: Vec<TestSession>,
}

impl QueryResult {
    /// The selected sessions.
    pub fn sessions(&self) -> &[TestSession] {
        &self.sessions
    }

    /// Consumes the result, returning the selected sessions.
    pub fn into_sessions(self) -> Vec<TestSession> {
        self.sessions
    }

    /// The number of selected sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no session matched.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
