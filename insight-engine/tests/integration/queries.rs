// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query scenarios: composing session and test filters over the corpus,
//! and replaying stored specs.

use crate::fixtures::*;
use insight_engine::{
    errors::QueryBuildError,
    query::{PredicateRegistry, Query, QuerySpec},
};
use insight_model::{TestOutcome, TestSession};
use pretty_assertions::assert_eq;

fn session_ids(sessions: &[TestSession]) -> Vec<&str> {
    sessions.iter().map(|session| session.session_id()).collect()
}

fn nodeids(session: &TestSession) -> Vec<&str> {
    session
        .test_results()
        .iter()
        .map(|result| result.nodeid().as_str())
        .collect()
}

#[test]
fn sut_and_tag_filters_compose() {
    let corpus = full_corpus();
    let result = Query::new()
        .for_sut(API_SUT)
        .with_tag("environment", "ci")
        .execute(&corpus)
        .expect("query runs");

    assert_eq!(
        session_ids(result.sessions()),
        ["api-001", "api-003", "api-005", "api-007", "api-009"],
    );
}

#[test]
fn relative_windows_anchor_at_the_given_now() {
    let corpus = full_corpus();
    let now = timestamp("2026-03-11T12:00:00+00:00");
    let result = Query::new()
        .in_last_days(2)
        .execute_at(&corpus, now)
        .expect("query runs");

    assert_eq!(session_ids(result.sessions()), ["api-009", "api-010"]);
}

#[test]
fn test_filters_narrow_sessions_to_matching_results() {
    let corpus = full_corpus();
    let result = Query::new()
        .filter_by_test()
        .with_outcome(TestOutcome::Failed)
        .apply()
        .execute(&corpus)
        .expect("query runs");

    // Every session has at least one failure, so none are dropped, but
    // each is narrowed to its failing results.
    assert_eq!(result.len(), 12);
    let total_results: usize = result
        .sessions()
        .iter()
        .map(|session| session.test_results().len())
        .sum();
    assert_eq!(total_results, 17);

    let first = &result.sessions()[0];
    assert_eq!(first.session_id(), "api-001");
    assert_eq!(nodeids(first), [RANKING]);
    // Session metadata survives narrowing.
    assert_eq!(first.tag("environment"), Some("ci"));

    let regressed = &result.sessions()[11];
    assert_eq!(regressed.session_id(), "api-010");
    assert_eq!(nodeids(regressed), [RANKING, LOGIN]);
}

#[test]
fn session_id_globs_and_test_substrings_compose() {
    let corpus = full_corpus();
    let result = Query::new()
        .session_id_matches("api-*")
        .filter_by_test()
        .nodeid_contains("test_search")
        .apply()
        .execute(&corpus)
        .expect("query runs");

    assert_eq!(result.len(), 10);
    for session in result.sessions() {
        assert_eq!(nodeids(session), [INDEX, RANKING]);
    }
}

#[test]
fn specs_survive_json_and_reproduce_results() {
    let corpus = full_corpus();
    let now = timestamp("2026-03-12T00:00:00+00:00");
    let query = Query::new()
        .for_sut(API_SUT)
        .with_tag("environment", "staging")
        .filter_by_test()
        .with_outcome(TestOutcome::Failed)
        .apply();

    let spec = query.to_spec().expect("spec builds");
    let json = serde_json::to_string(&spec).expect("spec serializes");
    let reparsed: QuerySpec = serde_json::from_str(&json).expect("spec parses");
    assert_eq!(reparsed, spec);

    let rebuilt = Query::from_spec(&reparsed).expect("query rebuilds");
    let direct = query.execute_at(&corpus, now).expect("query runs");
    let replayed = rebuilt.execute_at(&corpus, now).expect("replay runs");
    assert_eq!(replayed.sessions(), direct.sessions());
    assert_eq!(
        session_ids(direct.sessions()),
        ["api-002", "api-004", "api-006", "api-008", "api-010"],
    );
}

#[test]
fn custom_predicates_resolve_through_a_registry() {
    let corpus = full_corpus();
    let spec = Query::new()
        .filter_by_test()
        .custom("timed-out", |result| {
            result
                .longreprtext()
                .is_some_and(|text| text.contains("TimeoutError"))
        })
        .apply()
        .to_spec()
        .expect("spec builds");

    // Without the function the spec is just a name.
    let error = Query::from_spec(&spec).expect_err("missing predicate");
    assert_eq!(
        error,
        QueryBuildError::UnknownPredicate {
            name: "timed-out".to_owned(),
        },
    );

    let mut registry = PredicateRegistry::new();
    registry.register("timed-out", |result| {
        result
            .longreprtext()
            .is_some_and(|text| text.contains("TimeoutError"))
    });
    let rebuilt = Query::from_spec_with_predicates(&spec, &registry).expect("query rebuilds");
    let result = rebuilt.execute(&corpus).expect("query runs");

    assert_eq!(
        session_ids(result.sessions()),
        ["api-006", "api-007", "api-008", "api-009", "api-010"],
    );
    for session in result.sessions() {
        assert_eq!(nodeids(session), [LOGIN]);
    }
}
