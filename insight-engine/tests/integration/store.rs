// Copyright (c) The test-insight Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence scenarios: appending, reloading, filtered loads, and lock
//! contention against a real file on disk.

use crate::fixtures::*;
use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use insight_engine::{
    errors::StoreError,
    query::Query,
    store::{JsonStore, SessionStore, StoreConfig},
};
use pretty_assertions::assert_eq;
use std::{fs::OpenOptions, time::Duration};

fn store_in(dir: &Utf8TempDir) -> JsonStore {
    JsonStore::new(StoreConfig::new(dir.path().join("sessions.json")))
}

#[test]
fn saved_sessions_load_back_in_order() {
    let dir = Utf8TempDir::new().expect("temp dir created");
    let store = store_in(&dir);
    let corpus = full_corpus();
    for session in &corpus {
        store.save_session(session).expect("session saves");
    }

    let loaded = store.load_sessions().expect("store loads");
    assert_eq!(loaded, corpus);

    // The lock file stays behind as a sibling of the sessions file.
    assert!(dir.path().join("sessions.json.lock").exists());
}

#[test]
fn sessions_file_is_headered_jsonl() {
    let dir = Utf8TempDir::new().expect("temp dir created");
    let store = store_in(&dir);
    for session in full_corpus() {
        store.save_session(&session).expect("session saves");
    }

    let raw = std::fs::read_to_string(dir.path().join("sessions.json")).expect("file reads");
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 13);
    assert_eq!(lines[0], r#"{"format-version":1}"#);
    for line in &lines[1..] {
        serde_json::from_str::<serde_json::Value>(line).expect("session lines are JSON");
    }
}

#[test]
fn filtered_load_applies_a_stored_spec() {
    let dir = Utf8TempDir::new().expect("temp dir created");
    let store = store_in(&dir);
    for session in full_corpus() {
        store.save_session(&session).expect("session saves");
    }

    let spec = Query::new()
        .for_sut(BILLING_SUT)
        .to_spec()
        .expect("spec builds");
    let billing = store.load_sessions_filtered(&spec).expect("filtered load");
    let ids: Vec<&str> = billing.iter().map(|session| session.session_id()).collect();
    assert_eq!(ids, ["billing-001", "billing-002"]);
}

#[test]
fn held_lock_times_out_readers_until_released() {
    let dir = Utf8TempDir::new().expect("temp dir created");
    let path = dir.path().join("sessions.json");
    let store = JsonStore::new(
        StoreConfig::new(path.clone()).with_lock_timeout(Duration::from_millis(300)),
    );
    let corpus = full_corpus();
    store.save_session(&corpus[0]).expect("session saves");

    // Grab the lock the way a concurrent writer would and hold it across a
    // load attempt.
    let lock_path = Utf8PathBuf::from(format!("{path}.lock"));
    let blocker = OpenOptions::new()
        .write(true)
        .open(&lock_path)
        .expect("lock file opens");
    blocker.try_lock().expect("exclusive lock acquired");

    let error = store.load_sessions().expect_err("load should time out");
    assert!(
        matches!(&error, StoreError::FileLockTimeout { path, .. } if *path == lock_path),
        "unexpected error: {error:?}"
    );

    blocker.unlock().expect("lock releases");
    let loaded = store.load_sessions().expect("store loads after release");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].session_id(), "api-001");
}
