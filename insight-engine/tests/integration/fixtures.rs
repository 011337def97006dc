// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A deterministic two-week corpus shared by the integration scenarios.
//!
//! The `api-service` history covers 10 daily sessions, 2026-03-02 (a
//! Monday) through 2026-03-11, started at 10:00 UTC with a fixed 300s
//! session duration and alternating `ci`/`staging` environment tags:
//!
//! * `test_charge` passes every session (1s);
//! * `test_refund` passes every session (2s), but needs one rerun in
//!   sessions 2, 5, and 8, each recorded as a recovered rerun group;
//! * `test_index` passes every session and is slow (10s);
//! * `test_ranking` fails every session with the same `AssertionError`;
//! * `test_login` passes in sessions 1-5, then regresses: sessions 6-10
//!   fail with a `TimeoutError`.
//!
//! That puts each session's tests of record at 5, the aggregate pass rate
//! at 35/50 = 0.7, and the per-session pass rate at 0.8 before the
//! regression and 0.6 after.
//!
//! Two `billing-service` sessions (2026-03-06 and 2026-03-07, 12:00 UTC)
//! carry an unrelated pair of tests, one passing and one failing, so that
//! SUT filters and comparisons have a second suite to work against.

use chrono::{DateTime, FixedOffset, NaiveDate};
use insight_model::{RerunTestGroup, TestOutcome, TestResult, TestSession};
use std::time::Duration;

pub(crate) const API_SUT: &str = "api-service";
pub(crate) const BILLING_SUT: &str = "billing-service";

pub(crate) const CHARGE: &str = "tests/test_checkout.py::test_charge";
pub(crate) const REFUND: &str = "tests/test_checkout.py::test_refund";
pub(crate) const INDEX: &str = "tests/test_search.py::test_index";
pub(crate) const RANKING: &str = "tests/test_search.py::test_ranking";
pub(crate) const LOGIN: &str = "tests/test_auth.py::test_login";
pub(crate) const INVOICE_TOTAL: &str = "tests/test_invoice.py::test_total";
pub(crate) const INVOICE_TAX: &str = "tests/test_invoice.py::test_tax";

const RANKING_LONGREPR: &str = "def test_ranking():\n\
     >       assert ranking == expected\n\
     E       AssertionError: assert [3, 1, 2] == [1, 2, 3]";
const LOGIN_LONGREPR: &str = "def test_login():\n\
     >       client.login(user)\n\
     E       TimeoutError: request timed out after 30s";
const TAX_LONGREPR: &str = "E       ValueError: unknown tax region 'EU-27'";

pub(crate) const RANKING_PATTERN: &str = "AssertionError: assert [3, 1, 2] == [1, 2, 3]";
pub(crate) const LOGIN_PATTERN: &str = "TimeoutError: request timed out after 30s";
pub(crate) const TAX_PATTERN: &str = "ValueError: unknown tax region 'EU-27'";

pub(crate) fn timestamp(value: &str) -> DateTime<FixedOffset> {
    value.parse().expect("fixture timestamps parse")
}

#[track_caller]
pub(crate) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

pub(crate) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("fixture dates are valid")
}

pub(crate) fn passed(nodeid: &str, start: DateTime<FixedOffset>, secs: u64) -> TestResult {
    TestResult::builder(nodeid, TestOutcome::Passed, start)
        .duration(Duration::from_secs(secs))
        .build()
        .expect("fixture results build")
}

pub(crate) fn failed(
    nodeid: &str,
    start: DateTime<FixedOffset>,
    secs: u64,
    longreprtext: &str,
) -> TestResult {
    TestResult::builder(nodeid, TestOutcome::Failed, start)
        .duration(Duration::from_secs(secs))
        .longreprtext(longreprtext)
        .build()
        .expect("fixture results build")
}

fn rerun_attempt(nodeid: &str, start: DateTime<FixedOffset>, secs: u64) -> TestResult {
    TestResult::builder(nodeid, TestOutcome::Rerun, start)
        .duration(Duration::from_secs(secs))
        .build()
        .expect("fixture results build")
}

/// Builds the api-service session for 1-based day `index`.
fn api_session(index: usize) -> TestSession {
    let day = index + 1;
    let start = timestamp(&format!("2026-03-{day:02}T10:00:00+00:00"));
    let environment = if index % 2 == 1 { "ci" } else { "staging" };
    let mut session = TestSession::builder(format!("api-{index:03}"), API_SUT, start)
        .duration(Duration::from_secs(300))
        .tag("environment", environment)
        .build()
        .expect("fixture sessions build");

    session.add_test_result(passed(CHARGE, start, 1));

    // Sessions 2, 5, and 8 need a rerun to get test_refund through.
    if matches!(index, 2 | 5 | 8) {
        let attempt = rerun_attempt(REFUND, start, 2);
        let recovery = passed(REFUND, start, 2);
        session.add_test_result(attempt.clone());
        session.add_test_result(recovery.clone());
        let mut group = RerunTestGroup::new(REFUND);
        group.add_test(attempt).expect("rerun attempts append");
        group.add_test(recovery).expect("rerun attempts append");
        session.add_rerun_group(group).expect("rerun groups append");
    } else {
        session.add_test_result(passed(REFUND, start, 2));
    }

    session.add_test_result(passed(INDEX, start, 10));
    session.add_test_result(failed(RANKING, start, 2, RANKING_LONGREPR));
    if index <= 5 {
        session.add_test_result(passed(LOGIN, start, 1));
    } else {
        session.add_test_result(failed(LOGIN, start, 1, LOGIN_LONGREPR));
    }

    session
}

fn billing_session(index: usize) -> TestSession {
    let day = index + 5;
    let start = timestamp(&format!("2026-03-{day:02}T12:00:00+00:00"));
    let mut session = TestSession::builder(format!("billing-{index:03}"), BILLING_SUT, start)
        .duration(Duration::from_secs(120))
        .tag("environment", "ci")
        .build()
        .expect("fixture sessions build");
    session.add_test_result(passed(INVOICE_TOTAL, start, 3));
    session.add_test_result(failed(INVOICE_TAX, start, 3, TAX_LONGREPR));
    session
}

/// The 10 api-service sessions, oldest first.
pub(crate) fn api_history() -> Vec<TestSession> {
    (1..=10).map(api_session).collect()
}

/// All 12 sessions in chronological order.
pub(crate) fn full_corpus() -> Vec<TestSession> {
    let mut corpus = api_history();
    corpus.push(billing_session(1));
    corpus.push(billing_session(2));
    corpus.sort_by_key(|session| session.session_start_time());
    corpus
}
