// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::ModelBuildError, node_id::NodeId, test_result::TestResult};
use serde::{Deserialize, Serialize};

/// All execution attempts of a single test within one session, in
/// chronological order.
///
/// Groups are built up one attempt at a time; every attempt must carry the
/// node ID the group was created for. The last attempt is the outcome of
/// record: earlier attempts have the `rerun` outcome, and the final attempt
/// determines whether the test recovered.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "RerunTestGroupWire", into = "RerunTestGroupWire")]
pub struct RerunTestGroup {
    nodeid: NodeId,
    tests: Vec<TestResult>,
}

impl RerunTestGroup {
    /// Creates a new, empty group for the given test.
    pub fn new(nodeid: impl Into<NodeId>) -> Self {
        Self {
            nodeid: nodeid.into(),
            tests: Vec::new(),
        }
    }

    /// The node ID shared by every attempt in this group.
    pub fn nodeid(&self) -> &NodeId {
        &self.nodeid
    }

    /// Appends an attempt to the group.
    ///
    /// Returns [`ModelBuildError::NodeIdMismatch`] if the result belongs to
    /// a different test.
    pub fn add_test(&mut self, test: TestResult) -> Result<(), ModelBuildError> {
        if test.nodeid() != &self.nodeid {
            return Err(ModelBuildError::NodeIdMismatch {
                expected: self.nodeid.clone(),
                actual: test.nodeid().clone(),
            });
        }
        self.tests.push(test);
        Ok(())
    }

    /// Iterates over the attempts in chronological order.
    pub fn attempts(&self) -> impl Iterator<Item = &'_ TestResult> + DoubleEndedIterator + '_ {
        self.tests.iter()
    }

    /// Returns the number of attempts recorded so far.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if no attempts have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Returns the final attempt.
    ///
    /// This attempt is used as the result of record for the test.
    pub fn final_attempt(&self) -> Option<&TestResult> {
        self.tests.last()
    }

    /// Returns the outcome of the final attempt.
    pub fn final_outcome(&self) -> Option<crate::TestOutcome> {
        self.final_attempt().map(|test| test.outcome())
    }

    /// Returns true if the test passed after at least one rerun.
    pub fn is_recovered(&self) -> bool {
        self.tests.len() > 1 && self.final_outcome() == Some(crate::TestOutcome::Passed)
    }

    /// Returns the number of attempts before the final one.
    pub fn rerun_count(&self) -> usize {
        self.tests.len().saturating_sub(1)
    }
}

/// The serialized form of a [`RerunTestGroup`].
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
struct RerunTestGroupWire {
    nodeid: NodeId,
    tests: Vec<TestResult>,
}

impl From<RerunTestGroup> for RerunTestGroupWire {
    fn from(group: RerunTestGroup) -> Self {
        Self {
            nodeid: group.nodeid,
            tests: group.tests,
        }
    }
}

impl TryFrom<RerunTestGroupWire> for RerunTestGroup {
    type Error = ModelBuildError;

    fn try_from(wire: RerunTestGroupWire) -> Result<Self, Self::Error> {
        if wire.tests.is_empty() {
            return Err(ModelBuildError::EmptyRerunGroup {
                nodeid: wire.nodeid,
            });
        }
        let mut group = RerunTestGroup::new(wire.nodeid);
        for test in wire.tests {
            group.add_test(test)?;
        }
        Ok(group)
    }
}
