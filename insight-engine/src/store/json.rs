// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{SessionStore, SessionsJsonHeader, SessionsJsonWritePermission, StoreConfig};
use crate::errors::StoreError;
use insight_model::TestSession;
use std::{
    fs::{File, TryLockError},
    io::{self, BufRead, BufReader, Write},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy)]
enum LockKind {
    Shared,
    Exclusive,
}

/// A session store backed by a JSON Lines file.
///
/// The first line is a header record carrying the format version; every
/// following line is one serialized session. Loading takes a shared lock on
/// the sibling `.lock` file and reads a full snapshot; saving takes an
/// exclusive lock, appends the session, and replaces the file atomically. A
/// missing or empty file reads as an empty store.
///
/// ```no_run
/// use insight_engine::store::{JsonStore, SessionStore, StoreConfig};
///
/// # fn example(session: &insight_model::TestSession) -> Result<(), insight_engine::errors::StoreError> {
/// let store = JsonStore::new(StoreConfig::new("insight/sessions.json"));
/// store.save_session(session)?;
/// let sessions = store.load_sessions()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct JsonStore {
    config: StoreConfig,
}

impl JsonStore {
    /// Creates a store over the configured file.
    ///
    /// Nothing is touched on disk until the first load or save.
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens (creating if needed) the lock file and acquires a lock on it.
    fn acquire_lock(&self, kind: LockKind) -> Result<File, StoreError> {
        let lock_path = self.config.lock_path();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|error| StoreError::FileLock {
                path: lock_path.clone(),
                error,
            })?;

        let timeout = self.config.lock_timeout();
        let start = Instant::now();
        let mut contended = false;
        loop {
            let result = match kind {
                LockKind::Shared => file.try_lock_shared(),
                LockKind::Exclusive => file.try_lock(),
            };

            match result {
                Ok(()) => return Ok(file),
                Err(TryLockError::WouldBlock) => {
                    // Lock is held by another process. Retry if we haven't
                    // timed out.
                    if !contended {
                        warn!("waiting for another process to release `{lock_path}`");
                        contended = true;
                    }
                    if start.elapsed() >= timeout {
                        return Err(StoreError::FileLockTimeout {
                            path: lock_path,
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(TryLockError::Error(error)) => {
                    // Some other error (e.g., locking not supported on this
                    // filesystem).
                    return Err(StoreError::FileLock {
                        path: lock_path,
                        error,
                    });
                }
            }
        }
    }

    /// Reads and deserializes the sessions file.
    ///
    /// The caller must hold the lock.
    fn read_store_file(&self) -> Result<ReadStoreResult, StoreError> {
        let path = self.config.path();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) => {
                if error.kind() == io::ErrorKind::NotFound {
                    // The file doesn't exist yet, so we can write a new one.
                    return Ok(ReadStoreResult::empty());
                } else {
                    return Err(StoreError::FileRead {
                        path: path.to_owned(),
                        error,
                    });
                }
            }
        };

        let mut lines = BufReader::new(file).lines().enumerate();
        let header: SessionsJsonHeader = match lines.next() {
            None => return Ok(ReadStoreResult::empty()),
            Some((_, Err(error))) => {
                return Err(StoreError::FileRead {
                    path: path.to_owned(),
                    error,
                });
            }
            Some((_, Ok(line))) => {
                serde_json::from_str(&line).map_err(|error| StoreError::HeaderDeserialize {
                    path: path.to_owned(),
                    error,
                })?
            }
        };

        let mut sessions = Vec::new();
        for (index, line) in lines {
            let line = line.map_err(|error| StoreError::FileRead {
                path: path.to_owned(),
                error,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let session: TestSession =
                serde_json::from_str(&line).map_err(|error| StoreError::SessionDeserialize {
                    path: path.to_owned(),
                    line: index + 1,
                    error,
                })?;
            sessions.push(session);
        }

        Ok(ReadStoreResult {
            sessions,
            write_permission: header.write_permission(),
        })
    }
}

impl SessionStore for JsonStore {
    fn load_sessions(&self) -> Result<Vec<TestSession>, StoreError> {
        if !self.config.path().exists() {
            // Never written; nothing to lock or read.
            return Ok(Vec::new());
        }

        let _lock = self.acquire_lock(LockKind::Shared)?;
        let result = self.read_store_file()?;
        debug!(
            "loaded {} sessions from `{}`",
            result.sessions.len(),
            self.config.path()
        );
        Ok(result.sessions)
    }

    fn save_session(&self, session: &TestSession) -> Result<(), StoreError> {
        let path = self.config.path();
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|error| StoreError::DirCreate {
                    path: parent.to_owned(),
                    error,
                })?;
            }
        }

        let _lock = self.acquire_lock(LockKind::Exclusive)?;
        let existing = self.read_store_file()?;
        if let SessionsJsonWritePermission::Denied {
            file_version,
            max_supported_version,
        } = existing.write_permission
        {
            return Err(StoreError::FormatVersionTooNew {
                path: path.to_owned(),
                file_version,
                supported_version: max_supported_version,
            });
        }

        let mut lines = Vec::with_capacity(existing.sessions.len() + 1);
        for session in existing.sessions.iter().chain([session]) {
            lines.push(serde_json::to_string(session).map_err(|error| {
                StoreError::SessionSerialize {
                    session_id: session.session_id().to_owned(),
                    error,
                }
            })?);
        }

        atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
            .write(|file| {
                serde_json::to_writer(&mut *file, &SessionsJsonHeader::current())
                    .map_err(io::Error::from)?;
                writeln!(file)?;
                for line in &lines {
                    writeln!(file, "{line}")?;
                }
                Ok(())
            })
            .map_err(|error| StoreError::FileWrite {
                path: path.to_owned(),
                error,
            })?;

        debug!("saved {} sessions to `{}`", lines.len(), path);
        Ok(())
    }
}

struct ReadStoreResult {
    sessions: Vec<TestSession>,
    write_permission: SessionsJsonWritePermission,
}

impl ReadStoreResult {
    /// The state of a store whose file doesn't exist yet.
    fn empty() -> Self {
        Self {
            sessions: Vec::new(),
            write_permission: SessionsJsonWritePermission::Allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use chrono::{DateTime, FixedOffset};
    use insight_model::{TestOutcome, TestResult};
    use pretty_assertions::assert_eq;

    fn sample_session(id: &str, start: &str) -> TestSession {
        let start: DateTime<FixedOffset> = start.parse().unwrap();
        let mut session = TestSession::builder(id, "api-service", start)
            .duration(Duration::from_secs(60))
            .tag("environment", "ci")
            .build()
            .unwrap();
        session.add_test_result(
            TestResult::builder("tests/test_a.py::test_one", TestOutcome::Passed, start)
                .duration(Duration::from_secs(2))
                .build()
                .unwrap(),
        );
        session
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = Utf8TempDir::new().unwrap();
        let store = JsonStore::new(StoreConfig::new(dir.path().join("sessions.json")));

        assert_eq!(store.load_sessions().unwrap(), Vec::new());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = Utf8TempDir::new().unwrap();
        let store = JsonStore::new(StoreConfig::new(dir.path().join("sessions.json")));

        let first = sample_session("s1", "2026-03-01T10:00:00+00:00");
        let second = sample_session("s2", "2026-03-02T10:00:00+00:00");
        store.save_session(&first).unwrap();
        store.save_session(&second).unwrap();

        let loaded = store.load_sessions().unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/sessions.json");
        let store = JsonStore::new(StoreConfig::new(path));

        store
            .save_session(&sample_session("s1", "2026-03-01T10:00:00+00:00"))
            .unwrap();
        assert_eq!(store.load_sessions().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_line_fails_with_its_line_number() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        let store = JsonStore::new(StoreConfig::new(path.clone()));
        store
            .save_session(&sample_session("s1", "2026-03-01T10:00:00+00:00"))
            .unwrap();

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n");
        std::fs::write(&path, contents).unwrap();

        let error = store.load_sessions().unwrap_err();
        assert!(matches!(
            &error,
            StoreError::SessionDeserialize { line: 3, .. }
        ));
        assert!(error.to_string().contains("line 3"), "{error}");
    }

    #[test]
    fn file_without_header_fails_to_parse() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "this is not a sessions file\n").unwrap();
        let store = JsonStore::new(StoreConfig::new(path));

        assert!(matches!(
            store.load_sessions().unwrap_err(),
            StoreError::HeaderDeserialize { .. }
        ));
    }

    #[test]
    fn newer_format_version_loads_but_refuses_to_save() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        let store = JsonStore::new(StoreConfig::new(path.clone()));
        store
            .save_session(&sample_session("s1", "2026-03-01T10:00:00+00:00"))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let bumped = contents.replacen(
            "{\"format-version\":1}",
            "{\"format-version\":99}",
            1,
        );
        assert_ne!(contents, bumped);
        std::fs::write(&path, bumped).unwrap();

        // Reading tolerates the newer version.
        assert_eq!(store.load_sessions().unwrap().len(), 1);

        // Writing would destroy whatever the newer version recorded.
        let error = store
            .save_session(&sample_session("s2", "2026-03-02T10:00:00+00:00"))
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::FormatVersionTooNew { .. }
        ));
        assert!(error.to_string().contains("version 99"), "{error}");
    }
}
