// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable storage for recorded sessions.
//!
//! The engine consumes storage through the [`SessionStore`] trait, so
//! analyses never care where sessions come from. The bundled
//! [`JsonStore`] persists sessions as a JSON Lines file: a header record
//! carrying the format version, then one session per line. Writers take an
//! exclusive lock on a sibling `.lock` file and replace the store
//! atomically; readers take a shared lock just long enough to load a
//! snapshot.

mod json;

pub use json::JsonStore;

use crate::{
    errors::StoreError,
    query::{Query, QuerySpec},
};
use camino::{Utf8Path, Utf8PathBuf};
use insight_model::TestSession;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// How long writers and readers wait for the store lock by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// The current format version written to new sessions files.
pub(crate) const SESSIONS_JSON_FORMAT_VERSION: SessionsJsonFormatVersion =
    SessionsJsonFormatVersion::new(1);

/// Version of the sessions file outer format.
///
/// Increment this when adding new semantically important fields. Readers can
/// read newer versions (assuming append-only evolution with serde defaults),
/// but writers must refuse to write if the file version is higher than this.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SessionsJsonFormatVersion(u32);

impl SessionsJsonFormatVersion {
    /// Creates a new `SessionsJsonFormatVersion`.
    pub const fn new(version: u32) -> Self {
        Self(version)
    }
}

impl fmt::Display for SessionsJsonFormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The first record of a sessions file.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct SessionsJsonHeader {
    /// The format version of this file.
    pub(crate) format_version: SessionsJsonFormatVersion,
}

impl SessionsJsonHeader {
    /// The header written to new files.
    pub(crate) fn current() -> Self {
        Self {
            format_version: SESSIONS_JSON_FORMAT_VERSION,
        }
    }

    /// Returns whether a file with this header may be rewritten.
    pub(crate) fn write_permission(&self) -> SessionsJsonWritePermission {
        if self.format_version > SESSIONS_JSON_FORMAT_VERSION {
            SessionsJsonWritePermission::Denied {
                file_version: self.format_version,
                max_supported_version: SESSIONS_JSON_FORMAT_VERSION,
            }
        } else {
            SessionsJsonWritePermission::Allowed
        }
    }
}

/// Whether a sessions file can be written to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SessionsJsonWritePermission {
    /// Writing is allowed.
    Allowed,

    /// Writing is not allowed because the file has a newer format version.
    Denied {
        /// The format version in the file.
        file_version: SessionsJsonFormatVersion,

        /// The maximum version this crate can write.
        max_supported_version: SessionsJsonFormatVersion,
    },
}

/// Where a [`JsonStore`] lives and how patiently it waits for its lock.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    path: Utf8PathBuf,
    lock_timeout: Duration,
}

impl StoreConfig {
    /// Configures a store at `path` with the default 5 second lock timeout.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Overrides the lock timeout.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// The sessions file path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// How long lock acquisition may block before failing.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// The sibling lock file guarding the sessions file.
    pub(crate) fn lock_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.lock", self.path))
    }
}

/// The storage contract the engine consumes.
pub trait SessionStore {
    /// Loads a snapshot of every stored session.
    fn load_sessions(&self) -> Result<Vec<TestSession>, StoreError>;

    /// Appends one session to the store.
    fn save_session(&self, session: &TestSession) -> Result<(), StoreError>;

    /// Loads only the sessions admitted by a stored query spec.
    ///
    /// The default implementation loads everything and filters in memory.
    /// Specs naming custom predicates cannot be rebuilt here; stores with a
    /// predicate registry should override this.
    fn load_sessions_filtered(&self, spec: &QuerySpec) -> Result<Vec<TestSession>, StoreError> {
        let query = Query::from_spec(spec).map_err(StoreError::Query)?;
        let sessions = self.load_sessions()?;
        let result = query.execute(&sessions).map_err(StoreError::Query)?;
        Ok(result.into_sessions())
    }
}
