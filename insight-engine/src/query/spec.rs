// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::query::filters::{PredicateFn, TestField};
use chrono::{DateTime, FixedOffset};
use insight_model::{TestOutcome, TestResult};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// The serializable form of a query's filter configuration.
///
/// Specs round-trip: a query rebuilt from its spec and replayed against the
/// same sessions produces the same result. Custom predicates are carried by
/// name only; rebuilding a spec that names one requires a
/// [`PredicateRegistry`] providing the function.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuerySpec {
    /// Whole-session admit/reject filters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_filters: Vec<SessionFilterSpec>,

    /// Per-result filters applied within admitted sessions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_filters: Vec<TestPredicateSpec>,
}

/// One serialized session-level filter.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SessionFilterSpec {
    /// SUT name equality.
    #[serde(rename_all = "kebab-case")]
    Sut {
        /// The SUT name to match.
        name: String,
    },

    /// Tag equality.
    #[serde(rename_all = "kebab-case")]
    Tag {
        /// The tag key.
        key: String,
        /// The tag value to match.
        value: String,
    },

    /// At least one of the given tag pairs matches.
    #[serde(rename_all = "kebab-case")]
    TagsAny {
        /// The candidate pairs.
        pairs: Vec<TagPair>,
    },

    /// Session started within the last N days of execution time.
    #[serde(rename_all = "kebab-case")]
    InLastDays {
        /// The window size in days.
        days: u32,
    },

    /// Session started strictly before the timestamp.
    #[serde(rename_all = "kebab-case")]
    Before {
        /// The exclusive upper bound.
        timestamp: DateTime<FixedOffset>,
    },

    /// Session started strictly after the timestamp.
    #[serde(rename_all = "kebab-case")]
    After {
        /// The exclusive lower bound.
        timestamp: DateTime<FixedOffset>,
    },

    /// Session started within the inclusive range.
    #[serde(rename_all = "kebab-case")]
    Between {
        /// The inclusive start of the range.
        start: DateTime<FixedOffset>,
        /// The inclusive end of the range.
        end: DateTime<FixedOffset>,
    },

    /// Session ID matches a glob pattern.
    #[serde(rename_all = "kebab-case")]
    SessionIdMatches {
        /// The glob pattern.
        pattern: String,
    },
}

/// A tag key-value pair in a [`SessionFilterSpec::TagsAny`] filter.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TagPair {
    /// The tag key.
    pub key: String,

    /// The tag value.
    pub value: String,
}

/// One serialized test-level predicate.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TestPredicateSpec {
    /// Outcome equality.
    #[serde(rename_all = "kebab-case")]
    Outcome {
        /// The outcome to match.
        outcome: TestOutcome,
    },

    /// Node ID contains the substring.
    #[serde(rename_all = "kebab-case")]
    NodeidContains {
        /// The substring to look for (case-sensitive).
        substring: String,
    },

    /// A text field matches a glob pattern.
    #[serde(rename_all = "kebab-case")]
    FieldMatches {
        /// The field the pattern applies to.
        field: TestField,
        /// The glob pattern.
        pattern: String,
    },

    /// Duration in seconds within the inclusive range.
    #[serde(rename_all = "kebab-case")]
    DurationBetween {
        /// The inclusive lower bound, in seconds.
        min_secs: f64,
        /// The inclusive upper bound, in seconds.
        max_secs: f64,
    },

    /// The result raised warnings.
    HasWarning,

    /// A named custom predicate.
    ///
    /// Only the name crosses the wire; the function must be re-supplied
    /// through a [`PredicateRegistry`] when the spec is rebuilt.
    #[serde(rename_all = "kebab-case")]
    Custom {
        /// The registered predicate name.
        name: String,
    },
}

/// Named predicate functions for rebuilding queries from specs.
///
/// A spec serializes a custom predicate by name only. To rebuild such a
/// spec, register the function under the same name and pass the registry to
/// [`Query::from_spec_with_predicates`].
///
/// [`Query::from_spec_with_predicates`]: crate::query::Query::from_spec_with_predicates
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: BTreeMap<String, PredicateFn>,
}

impl PredicateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a predicate under a name, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        predicate: impl Fn(&TestResult) -> bool + Send + Sync + 'static,
    ) {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    /// Looks up a predicate by name.
    pub(crate) fn get(&self, name: &str) -> Option<&PredicateFn> {
        self.predicates.get(name)
    }

    /// Iterates over the registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.predicates.keys().map(String::as_str)
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("names", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn spec_serializes_kebab_case() {
        let spec = QuerySpec {
            session_filters: vec![
                SessionFilterSpec::Sut {
                    name: "api-service".to_owned(),
                },
                SessionFilterSpec::InLastDays { days: 30 },
            ],
            test_filters: vec![
                TestPredicateSpec::HasWarning,
                TestPredicateSpec::FieldMatches {
                    field: TestField::Longreprtext,
                    pattern: "*ConnectionError*".to_owned(),
                },
            ],
        };

        let json = serde_json::to_value(&spec).expect("serialization succeeds");
        assert_eq!(
            json,
            serde_json::json!({
                "session-filters": [
                    {"kind": "sut", "name": "api-service"},
                    {"kind": "in-last-days", "days": 30},
                ],
                "test-filters": [
                    {"kind": "has-warning"},
                    {
                        "kind": "field-matches",
                        "field": "longreprtext",
                        "pattern": "*ConnectionError*",
                    },
                ],
            })
        );

        let back: QuerySpec = serde_json::from_value(json).expect("deserialization succeeds");
        assert_eq!(back, spec);
    }

    #[test]
    fn registry_reports_names_not_functions() {
        let mut registry = PredicateRegistry::new();
        registry.register("long-running", |result| {
            result.duration().as_secs_f64() > 10.0
        });
        registry.register("any", |_| true);

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["any", "long-running"]);
        let debug = format!("{registry:?}");
        assert!(debug.contains("long-running"), "{debug}");
    }
}
