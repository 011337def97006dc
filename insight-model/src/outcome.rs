// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::OutcomeParseError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The outcome of a single test execution attempt.
///
/// This is the closed set of outcomes pytest reports, including the
/// `rerun` outcome emitted for non-final attempts by retry plugins.
/// Outcomes serialize as their lowercase names.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum TestOutcome {
    /// The test passed.
    Passed,

    /// The test failed an assertion.
    Failed,

    /// The test was skipped.
    Skipped,

    /// The test was expected to fail and did (`xfail`).
    Xfailed,

    /// The test was expected to fail but passed (`xpass`).
    Xpassed,

    /// A non-final attempt of a retried test.
    ///
    /// The final attempt carries the outcome of record; `Rerun` results are
    /// excluded from test totals (see the crate-level counting rules).
    Rerun,

    /// The test errored outside its own assertions (collection or fixture
    /// failure).
    Error,
}

impl TestOutcome {
    /// Every outcome, in declaration order.
    pub const ALL: [TestOutcome; 7] = [
        TestOutcome::Passed,
        TestOutcome::Failed,
        TestOutcome::Skipped,
        TestOutcome::Xfailed,
        TestOutcome::Xpassed,
        TestOutcome::Rerun,
        TestOutcome::Error,
    ];

    /// Returns the lowercase string form of this outcome.
    pub const fn as_str(self) -> &'static str {
        match self {
            TestOutcome::Passed => "passed",
            TestOutcome::Failed => "failed",
            TestOutcome::Skipped => "skipped",
            TestOutcome::Xfailed => "xfailed",
            TestOutcome::Xpassed => "xpassed",
            TestOutcome::Rerun => "rerun",
            TestOutcome::Error => "error",
        }
    }

    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 7] {
        [
            "passed", "failed", "skipped", "xfailed", "xpassed", "rerun", "error",
        ]
    }

    /// Parses an outcome from an optional string, case-insensitively.
    ///
    /// A missing outcome maps to [`TestOutcome::Skipped`]: pytest reports no
    /// outcome for tests that never ran.
    pub fn parse_optional(input: Option<&str>) -> Result<Self, OutcomeParseError> {
        match input {
            Some(input) => input.parse(),
            None => Ok(TestOutcome::Skipped),
        }
    }

    /// Returns true if this outcome represents a failure of record:
    /// [`TestOutcome::Failed`] or [`TestOutcome::Error`].
    pub const fn is_failed(self) -> bool {
        matches!(self, TestOutcome::Failed | TestOutcome::Error)
    }
}

impl FromStr for TestOutcome {
    type Err = OutcomeParseError;

    /// Parses an outcome case-insensitively; unknown strings are rejected.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "passed" => Ok(TestOutcome::Passed),
            "failed" => Ok(TestOutcome::Failed),
            "skipped" => Ok(TestOutcome::Skipped),
            "xfailed" => Ok(TestOutcome::Xfailed),
            "xpassed" => Ok(TestOutcome::Xpassed),
            "rerun" => Ok(TestOutcome::Rerun),
            "error" => Ok(TestOutcome::Error),
            _ => Err(OutcomeParseError::new(input)),
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-outcome tallies for a set of test results.
///
/// The `total` and `pass_rate` accessors implement the crate-level counting
/// rules: rerun attempts are tallied separately and excluded from test
/// totals.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutcomeCounts {
    /// The number of passed tests.
    pub passed: usize,

    /// The number of failed tests.
    pub failed: usize,

    /// The number of skipped tests.
    pub skipped: usize,

    /// The number of expected failures.
    pub xfailed: usize,

    /// The number of unexpected passes.
    pub xpassed: usize,

    /// The number of non-final rerun attempts.
    pub rerun: usize,

    /// The number of tests that errored.
    pub error: usize,
}

impl OutcomeCounts {
    /// Tallies the outcomes of an iterator of results.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = TestOutcome>) -> Self {
        let mut counts = Self::default();
        for outcome in outcomes {
            counts.record(outcome);
        }
        counts
    }

    /// Records one outcome.
    pub fn record(&mut self, outcome: TestOutcome) {
        match outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Failed => self.failed += 1,
            TestOutcome::Skipped => self.skipped += 1,
            TestOutcome::Xfailed => self.xfailed += 1,
            TestOutcome::Xpassed => self.xpassed += 1,
            TestOutcome::Rerun => self.rerun += 1,
            TestOutcome::Error => self.error += 1,
        }
    }

    /// The number of tests, excluding non-final rerun attempts.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.xfailed + self.xpassed + self.error
    }

    /// The number of execution attempts, including rerun attempts.
    pub fn attempts(&self) -> usize {
        self.total() + self.rerun
    }

    /// The number of failures of record (`failed` plus `error`).
    pub fn failed_of_record(&self) -> usize {
        self.failed + self.error
    }

    /// The fraction of tests that passed, in `[0, 1]`.
    ///
    /// Returns 0.0 when there are no tests.
    pub fn pass_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.passed as f64 / total as f64
        }
    }
}
