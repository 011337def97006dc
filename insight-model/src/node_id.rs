// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, fmt};

/// The stable identity of a test case: a pytest node ID.
///
/// Node IDs have the form `path::name`, e.g.
/// `tests/test_login.py::test_oauth_refresh` or, for class-based tests,
/// `tests/test_api.py::TestUsers::test_create`. The same node ID appearing
/// in different sessions refers to the same test, which is what makes
/// cross-session aggregation possible.
///
/// Backed by [`SmolStr`], so cloning is cheap: node IDs are used as map keys
/// throughout the engine.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct NodeId(SmolStr);

impl NodeId {
    /// Creates a new `NodeId`.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// Returns the node ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(SmolStr::from(id))
    }
}
