// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ModelBuildError,
    outcome::{OutcomeCounts, TestOutcome},
    rerun::RerunTestGroup,
    test_result::{TestResult, derive_timing, duration_from_secs},
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

/// One recorded run of a test suite against a system under test.
///
/// A session carries identity and environment metadata plus every execution
/// attempt observed during the run. Metadata is fixed at build time; results
/// and rerun groups accrete through [`add_test_result`] and
/// [`add_rerun_group`] while the run is being recorded, after which the
/// session is persisted and treated as read-only history.
///
/// `test_results` holds every attempt, including intermediate attempts
/// recorded with the `rerun` outcome. Totals and pass rates count only
/// non-`rerun` results; see [`OutcomeCounts`].
///
/// [`add_test_result`]: Self::add_test_result
/// [`add_rerun_group`]: Self::add_rerun_group
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "TestSessionWire", into = "TestSessionWire")]
pub struct TestSession {
    session_id: String,
    sut_name: String,
    session_start_time: DateTime<FixedOffset>,
    session_stop_time: DateTime<FixedOffset>,
    session_duration: Duration,
    test_results: Vec<TestResult>,
    rerun_test_groups: Vec<RerunTestGroup>,
    session_tags: BTreeMap<String, String>,
    testing_system: BTreeMap<String, serde_json::Value>,
}

impl TestSession {
    /// Starts building a new `TestSession`.
    pub fn builder(
        session_id: impl Into<String>,
        sut_name: impl Into<String>,
        session_start_time: DateTime<FixedOffset>,
    ) -> TestSessionBuilder {
        TestSessionBuilder {
            session_id: session_id.into(),
            sut_name: sut_name.into(),
            session_start_time,
            session_stop_time: None,
            session_duration: None,
            session_tags: BTreeMap::new(),
            testing_system: BTreeMap::new(),
        }
    }

    /// Returns a builder pre-filled with this session's metadata.
    ///
    /// Results and rerun groups are not carried over; re-add the ones the
    /// rebuilt session should contain.
    pub fn to_builder(&self) -> TestSessionBuilder {
        TestSessionBuilder {
            session_id: self.session_id.clone(),
            sut_name: self.sut_name.clone(),
            session_start_time: self.session_start_time,
            session_stop_time: Some(self.session_stop_time),
            session_duration: Some(self.session_duration),
            session_tags: self.session_tags.clone(),
            testing_system: self.testing_system.clone(),
        }
    }

    /// The unique ID of this session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The name of the system under test.
    pub fn sut_name(&self) -> &str {
        &self.sut_name
    }

    /// The time at which the session started.
    pub fn session_start_time(&self) -> DateTime<FixedOffset> {
        self.session_start_time
    }

    /// The time at which the session stopped.
    pub fn session_stop_time(&self) -> DateTime<FixedOffset> {
        self.session_stop_time
    }

    /// How long the session took.
    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }

    /// Every execution attempt recorded in this session, in insertion order.
    pub fn test_results(&self) -> &[TestResult] {
        &self.test_results
    }

    /// The rerun groups recorded in this session, in insertion order.
    pub fn rerun_test_groups(&self) -> &[RerunTestGroup] {
        &self.rerun_test_groups
    }

    /// Key-value tags describing the session environment.
    pub fn session_tags(&self) -> &BTreeMap<String, String> {
        &self.session_tags
    }

    /// Returns the value of a single tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.session_tags.get(key).map(String::as_str)
    }

    /// Freeform metadata about the testing system itself.
    pub fn testing_system(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.testing_system
    }

    /// Appends an execution attempt to the session.
    pub fn add_test_result(&mut self, result: TestResult) {
        self.test_results.push(result);
    }

    /// Appends a rerun group to the session.
    ///
    /// Returns [`ModelBuildError::EmptyRerunGroup`] if the group has no
    /// attempts.
    pub fn add_rerun_group(&mut self, group: RerunTestGroup) -> Result<(), ModelBuildError> {
        if group.is_empty() {
            return Err(ModelBuildError::EmptyRerunGroup {
                nodeid: group.nodeid().clone(),
            });
        }
        self.rerun_test_groups.push(group);
        Ok(())
    }

    /// Returns the number of tests in the session, excluding intermediate
    /// `rerun` attempts.
    pub fn test_count(&self) -> usize {
        self.test_results
            .iter()
            .filter(|result| result.outcome() != TestOutcome::Rerun)
            .count()
    }

    /// Tallies this session's results per outcome.
    pub fn outcome_counts(&self) -> OutcomeCounts {
        OutcomeCounts::from_outcomes(self.test_results.iter().map(|result| result.outcome()))
    }

    /// Returns the final outcome recorded for a test, judging the last
    /// attempt.
    ///
    /// A rerun group for the nodeid takes precedence over loose results.
    pub fn final_outcome_of(&self, nodeid: &str) -> Option<TestOutcome> {
        if let Some(group) = self
            .rerun_test_groups
            .iter()
            .find(|group| group.nodeid().as_str() == nodeid)
        {
            return group.final_outcome();
        }
        self.test_results
            .iter()
            .rev()
            .find(|result| result.nodeid().as_str() == nodeid)
            .map(|result| result.outcome())
    }

    /// Returns the final outcome of every distinct test in the session.
    pub fn final_outcomes(&self) -> BTreeMap<crate::NodeId, TestOutcome> {
        let mut outcomes = BTreeMap::new();
        for result in &self.test_results {
            outcomes.insert(result.nodeid().clone(), result.outcome());
        }
        for group in &self.rerun_test_groups {
            if let Some(outcome) = group.final_outcome() {
                outcomes.insert(group.nodeid().clone(), outcome);
            }
        }
        outcomes
    }

    /// Returns a copy of this session containing only the given results.
    ///
    /// Session metadata is unchanged; rerun groups are narrowed to those
    /// whose nodeid still appears among the retained results.
    pub fn with_test_results(&self, test_results: Vec<TestResult>) -> TestSession {
        let retained: BTreeSet<&str> = test_results
            .iter()
            .map(|result| result.nodeid().as_str())
            .collect();
        let rerun_test_groups = self
            .rerun_test_groups
            .iter()
            .filter(|group| retained.contains(group.nodeid().as_str()))
            .cloned()
            .collect();
        TestSession {
            session_id: self.session_id.clone(),
            sut_name: self.sut_name.clone(),
            session_start_time: self.session_start_time,
            session_stop_time: self.session_stop_time,
            session_duration: self.session_duration,
            test_results,
            rerun_test_groups,
            session_tags: self.session_tags.clone(),
            testing_system: self.testing_system.clone(),
        }
    }
}

/// Builder for [`TestSession`] metadata.
///
/// Created by [`TestSession::builder`] or [`TestSession::to_builder`].
/// Results and rerun groups are added to the built session afterwards.
#[derive(Clone, Debug)]
pub struct TestSessionBuilder {
    session_id: String,
    sut_name: String,
    session_start_time: DateTime<FixedOffset>,
    session_stop_time: Option<DateTime<FixedOffset>>,
    session_duration: Option<Duration>,
    session_tags: BTreeMap<String, String>,
    testing_system: BTreeMap<String, serde_json::Value>,
}

impl TestSessionBuilder {
    /// Sets the stop time.
    pub fn stop_time(mut self, stop_time: DateTime<FixedOffset>) -> Self {
        self.session_stop_time = Some(stop_time);
        self
    }

    /// Sets the duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.session_duration = Some(duration);
        self
    }

    /// Adds a session tag. Later values for the same key win.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_tags.insert(key.into(), value.into());
        self
    }

    /// Records a piece of testing-system metadata.
    pub fn testing_system(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.testing_system.insert(key.into(), value.into());
        self
    }

    /// Builds the [`TestSession`], deriving the missing half of the timing
    /// information.
    ///
    /// Returns [`ModelBuildError::MissingSessionTiming`] if neither a stop
    /// time nor a duration was supplied.
    pub fn build(self) -> Result<TestSession, ModelBuildError> {
        let (session_stop_time, session_duration) = derive_timing(
            self.session_start_time,
            self.session_stop_time,
            self.session_duration,
            &self.session_id,
        )
        .ok_or(ModelBuildError::MissingSessionTiming {
            session_id: self.session_id.clone(),
        })??;

        Ok(TestSession {
            session_id: self.session_id,
            sut_name: self.sut_name,
            session_start_time: self.session_start_time,
            session_stop_time,
            session_duration,
            test_results: Vec::new(),
            rerun_test_groups: Vec::new(),
            session_tags: self.session_tags,
            testing_system: self.testing_system,
        })
    }
}

/// The serialized form of a [`TestSession`].
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
struct TestSessionWire {
    session_id: String,
    sut_name: String,
    session_start_time: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_stop_time: Option<DateTime<FixedOffset>>,
    /// Duration in fractional seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    test_results: Vec<TestResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rerun_test_groups: Vec<RerunTestGroup>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    session_tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    testing_system: BTreeMap<String, serde_json::Value>,
}

impl From<TestSession> for TestSessionWire {
    fn from(session: TestSession) -> Self {
        Self {
            session_id: session.session_id,
            sut_name: session.sut_name,
            session_start_time: session.session_start_time,
            session_stop_time: Some(session.session_stop_time),
            session_duration: Some(session.session_duration.as_secs_f64()),
            test_results: session.test_results,
            rerun_test_groups: session.rerun_test_groups,
            session_tags: session.session_tags,
            testing_system: session.testing_system,
        }
    }
}

impl TryFrom<TestSessionWire> for TestSession {
    type Error = ModelBuildError;

    fn try_from(wire: TestSessionWire) -> Result<Self, Self::Error> {
        let duration = wire
            .session_duration
            .map(|secs| duration_from_secs(secs, &wire.session_id))
            .transpose()?;

        let mut builder = TestSession::builder(
            wire.session_id,
            wire.sut_name,
            wire.session_start_time,
        );
        if let Some(stop_time) = wire.session_stop_time {
            builder = builder.stop_time(stop_time);
        }
        if let Some(duration) = duration {
            builder = builder.duration(duration);
        }
        let mut session = builder.build()?;
        session.session_tags = wire.session_tags;
        session.testing_system = wire.testing_system;
        for result in wire.test_results {
            session.add_test_result(result);
        }
        for group in wire.rerun_test_groups {
            session.add_rerun_group(group)?;
        }
        Ok(session)
    }
}
