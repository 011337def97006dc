// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::ModelBuildError, node_id::NodeId, outcome::TestOutcome};
use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One execution attempt of one test.
///
/// A result is immutable once constructed; to change a field, rebuild it via
/// [`TestResult::to_builder`]. Construction requires a stop time or a
/// duration: whichever is missing is derived from the other, and supplying
/// neither is an error.
///
/// Serializes with kebab-case keys, the duration as fractional seconds, and
/// timestamps as RFC 3339 strings. Deserialization applies the same
/// either/or timing rule as the builder.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "TestResultWire", into = "TestResultWire")]
pub struct TestResult {
    nodeid: NodeId,
    outcome: TestOutcome,
    start_time: DateTime<FixedOffset>,
    stop_time: DateTime<FixedOffset>,
    duration: Duration,
    caplog: Option<String>,
    capstdout: Option<String>,
    capstderr: Option<String>,
    longreprtext: Option<String>,
    has_warning: bool,
}

impl TestResult {
    /// Starts building a new `TestResult`.
    pub fn builder(
        nodeid: impl Into<NodeId>,
        outcome: TestOutcome,
        start_time: DateTime<FixedOffset>,
    ) -> TestResultBuilder {
        TestResultBuilder {
            nodeid: nodeid.into(),
            outcome,
            start_time,
            stop_time: None,
            duration: None,
            caplog: None,
            capstdout: None,
            capstderr: None,
            longreprtext: None,
            has_warning: false,
        }
    }

    /// Returns a builder pre-filled with this result's fields.
    ///
    /// This is the explicit-rebuild path: results have no setters.
    pub fn to_builder(&self) -> TestResultBuilder {
        TestResultBuilder {
            nodeid: self.nodeid.clone(),
            outcome: self.outcome,
            start_time: self.start_time,
            stop_time: Some(self.stop_time),
            duration: Some(self.duration),
            caplog: self.caplog.clone(),
            capstdout: self.capstdout.clone(),
            capstderr: self.capstderr.clone(),
            longreprtext: self.longreprtext.clone(),
            has_warning: self.has_warning,
        }
    }

    /// The node ID identifying the test.
    pub fn nodeid(&self) -> &NodeId {
        &self.nodeid
    }

    /// The outcome of this attempt.
    pub fn outcome(&self) -> TestOutcome {
        self.outcome
    }

    /// The time at which the attempt started.
    pub fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    /// The time at which the attempt stopped.
    pub fn stop_time(&self) -> DateTime<FixedOffset> {
        self.stop_time
    }

    /// How long the attempt took.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Captured log output, if recorded.
    pub fn caplog(&self) -> Option<&str> {
        self.caplog.as_deref()
    }

    /// Captured standard output, if recorded.
    pub fn capstdout(&self) -> Option<&str> {
        self.capstdout.as_deref()
    }

    /// Captured standard error, if recorded.
    pub fn capstderr(&self) -> Option<&str> {
        self.capstderr.as_deref()
    }

    /// The failure representation text, if the attempt failed.
    pub fn longreprtext(&self) -> Option<&str> {
        self.longreprtext.as_deref()
    }

    /// True if the attempt raised warnings.
    pub fn has_warning(&self) -> bool {
        self.has_warning
    }
}

/// Builder for [`TestResult`].
///
/// Created by [`TestResult::builder`] or [`TestResult::to_builder`].
#[derive(Clone, Debug)]
pub struct TestResultBuilder {
    nodeid: NodeId,
    outcome: TestOutcome,
    start_time: DateTime<FixedOffset>,
    stop_time: Option<DateTime<FixedOffset>>,
    duration: Option<Duration>,
    caplog: Option<String>,
    capstdout: Option<String>,
    capstderr: Option<String>,
    longreprtext: Option<String>,
    has_warning: bool,
}

impl TestResultBuilder {
    /// Sets the stop time.
    pub fn stop_time(mut self, stop_time: DateTime<FixedOffset>) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    /// Sets the duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets captured log output.
    pub fn caplog(mut self, caplog: impl Into<String>) -> Self {
        self.caplog = Some(caplog.into());
        self
    }

    /// Sets captured standard output.
    pub fn capstdout(mut self, capstdout: impl Into<String>) -> Self {
        self.capstdout = Some(capstdout.into());
        self
    }

    /// Sets captured standard error.
    pub fn capstderr(mut self, capstderr: impl Into<String>) -> Self {
        self.capstderr = Some(capstderr.into());
        self
    }

    /// Sets the failure representation text.
    pub fn longreprtext(mut self, longreprtext: impl Into<String>) -> Self {
        self.longreprtext = Some(longreprtext.into());
        self
    }

    /// Sets whether the attempt raised warnings.
    pub fn has_warning(mut self, has_warning: bool) -> Self {
        self.has_warning = has_warning;
        self
    }

    /// Builds the [`TestResult`], deriving the missing half of the timing
    /// information.
    ///
    /// Returns [`ModelBuildError::MissingTiming`] if neither a stop time nor
    /// a duration was supplied.
    pub fn build(self) -> Result<TestResult, ModelBuildError> {
        let (stop_time, duration) = derive_timing(
            self.start_time,
            self.stop_time,
            self.duration,
            self.nodeid.as_str(),
        )
        .ok_or(ModelBuildError::MissingTiming {
            nodeid: self.nodeid.clone(),
        })??;

        Ok(TestResult {
            nodeid: self.nodeid,
            outcome: self.outcome,
            start_time: self.start_time,
            stop_time,
            duration,
            caplog: self.caplog,
            capstdout: self.capstdout,
            capstderr: self.capstderr,
            longreprtext: self.longreprtext,
            has_warning: self.has_warning,
        })
    }
}

/// Derives the `(stop_time, duration)` pair from whichever halves were given.
///
/// Returns `None` when neither was supplied. The inner `Result` carries
/// range failures (a duration too large to add to the start time). A stop
/// time before the start time floors the duration at zero rather than
/// failing: producer clocks do occasionally step backwards.
pub(crate) fn derive_timing(
    start_time: DateTime<FixedOffset>,
    stop_time: Option<DateTime<FixedOffset>>,
    duration: Option<Duration>,
    context: &str,
) -> Option<Result<(DateTime<FixedOffset>, Duration), ModelBuildError>> {
    match (stop_time, duration) {
        (Some(stop), Some(duration)) => Some(Ok((stop, duration))),
        (Some(stop), None) => {
            let duration = (stop - start_time).to_std().unwrap_or(Duration::ZERO);
            Some(Ok((stop, duration)))
        }
        (None, Some(duration)) => {
            let out_of_range = || ModelBuildError::InvalidDuration {
                context: context.to_owned(),
                seconds: duration.as_secs_f64(),
            };
            let delta = match TimeDelta::from_std(duration) {
                Ok(delta) => delta,
                Err(_) => return Some(Err(out_of_range())),
            };
            match start_time.checked_add_signed(delta) {
                Some(stop) => Some(Ok((stop, duration))),
                None => Some(Err(out_of_range())),
            }
        }
        (None, None) => None,
    }
}

/// Converts wire-format fractional seconds into a [`Duration`], rejecting
/// negative, non-finite, and out-of-range values.
pub(crate) fn duration_from_secs(
    seconds: f64,
    context: &str,
) -> Result<Duration, ModelBuildError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| ModelBuildError::InvalidDuration {
        context: context.to_owned(),
        seconds,
    })
}

/// The serialized form of a [`TestResult`].
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
struct TestResultWire {
    nodeid: NodeId,
    outcome: TestOutcome,
    start_time: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_time: Option<DateTime<FixedOffset>>,
    /// Duration in fractional seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    caplog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capstdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capstderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    longreprtext: Option<String>,
    #[serde(default)]
    has_warning: bool,
}

impl From<TestResult> for TestResultWire {
    fn from(result: TestResult) -> Self {
        Self {
            nodeid: result.nodeid,
            outcome: result.outcome,
            start_time: result.start_time,
            stop_time: Some(result.stop_time),
            duration: Some(result.duration.as_secs_f64()),
            caplog: result.caplog,
            capstdout: result.capstdout,
            capstderr: result.capstderr,
            longreprtext: result.longreprtext,
            has_warning: result.has_warning,
        }
    }
}

impl TryFrom<TestResultWire> for TestResult {
    type Error = ModelBuildError;

    fn try_from(wire: TestResultWire) -> Result<Self, Self::Error> {
        let duration = wire
            .duration
            .map(|secs| duration_from_secs(secs, wire.nodeid.as_str()))
            .transpose()?;

        let mut builder = TestResult::builder(wire.nodeid, wire.outcome, wire.start_time);
        if let Some(stop_time) = wire.stop_time {
            builder = builder.stop_time(stop_time);
        }
        if let Some(duration) = duration {
            builder = builder.duration(duration);
        }
        if let Some(caplog) = wire.caplog {
            builder = builder.caplog(caplog);
        }
        if let Some(capstdout) = wire.capstdout {
            builder = builder.capstdout(capstdout);
        }
        if let Some(capstderr) = wire.capstderr {
            builder = builder.capstderr(capstderr);
        }
        if let Some(longreprtext) = wire.longreprtext {
            builder = builder.longreprtext(longreprtext);
        }
        builder.has_warning(wire.has_warning).build()
    }
}
