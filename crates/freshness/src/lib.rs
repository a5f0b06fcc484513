// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-freshness: tracks when the agent last read or wrote a file and
//! rejects writes built on a stale read.
//!
//! A file is "fresh" when its on-disk mtime still matches the mtime
//! observed at the most recent `record_read`/`record_write` for that
//! session. The write lock registry is keyed by normalized absolute path
//! and is shared across *all* sessions: two sessions editing the same file
//! concurrently must serialize on the same lock, a session-scoped lock
//! would not prevent the race this tracker exists to catch.

use ag3nt_core::SessionId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FreshnessError {
    #[error("{path} was never read in this session")]
    FileNotRead { path: PathBuf },

    #[error("{path} changed on disk since it was read at {read_at}")]
    StaleFile {
        path: PathBuf,
        read_at: DateTime<Utc>,
    },

    #[error("io error reading metadata for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
struct FileRecord {
    read_at: DateTime<Utc>,
    mtime_at_read: SystemTime,
    written_at: Option<DateTime<Utc>>,
}

fn normalize(path: &Path) -> PathBuf {
    // Lexical normalization mirroring `os.path.normpath`: collapse `.`/`..`
    // segments without touching the filesystem (the file may not exist yet
    // for a pending write).
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component::*;
        match component {
            CurDir => {}
            ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn mtime_of(path: &Path) -> Result<SystemTime, FreshnessError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| FreshnessError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Per-path read/write freshness tracker, shared across sessions.
pub struct FileTracker {
    records: Mutex<HashMap<SessionId, HashMap<PathBuf, FileRecord>>>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Default for FileTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTracker {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_read(&self, session: &SessionId, path: &Path) -> Result<(), FreshnessError> {
        let path = normalize(path);
        let mtime = mtime_of(&path)?;
        let mut records = self.records.lock();
        records
            .entry(session.clone())
            .or_default()
            .insert(
                path,
                FileRecord {
                    read_at: Utc::now(),
                    mtime_at_read: mtime,
                    written_at: None,
                },
            );
        Ok(())
    }

    pub fn record_write(&self, session: &SessionId, path: &Path) -> Result<(), FreshnessError> {
        let path = normalize(path);
        let mtime = mtime_of(&path)?;
        let mut records = self.records.lock();
        let entry = records.entry(session.clone()).or_default();
        entry.insert(
            path,
            FileRecord {
                read_at: Utc::now(),
                mtime_at_read: mtime,
                written_at: Some(Utc::now()),
            },
        );
        Ok(())
    }

    /// Raising variant: used at tool-call boundaries where staleness must
    /// abort the operation.
    pub fn assert_fresh(&self, session: &SessionId, path: &Path) -> Result<(), FreshnessError> {
        let path = normalize(path);
        let records = self.records.lock();
        let record = records
            .get(session)
            .and_then(|m| m.get(&path))
            .ok_or_else(|| FreshnessError::FileNotRead { path: path.clone() })?
            .clone();
        drop(records);

        let current_mtime = mtime_of(&path)?;
        if current_mtime != record.mtime_at_read {
            return Err(FreshnessError::StaleFile {
                path,
                read_at: record.read_at,
            });
        }
        Ok(())
    }

    /// Non-raising variant for callers that want a boolean.
    pub fn is_fresh(&self, session: &SessionId, path: &Path) -> bool {
        self.assert_fresh(session, path).is_ok()
    }

    pub fn invalidate(&self, session: &SessionId, path: &Path) {
        let path = normalize(path);
        if let Some(m) = self.records.lock().get_mut(session) {
            m.remove(&path);
        }
    }

    pub fn invalidate_all_sessions(&self, path: &Path) {
        let path = normalize(path);
        let mut records = self.records.lock();
        for m in records.values_mut() {
            m.remove(&path);
        }
    }

    pub fn clear_session(&self, session: &SessionId) {
        self.records.lock().remove(session);
    }

    /// Acquire the global per-path write lock, creating it on first use.
    /// Held across a read-modify-write file operation to prevent two
    /// concurrent writers (any session) from racing on the same path.
    pub fn acquire_write_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let path = normalize(path);
        let mut locks = self.locks.lock();
        locks
            .entry(path.clone())
            .or_insert_with(|| {
                debug!(?path, "creating per-path write lock");
                Arc::new(Mutex::new(()))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn touch(file: &mut NamedTempFile, contents: &str) {
        file.as_file_mut().set_len(0).unwrap();
        use std::io::Seek;
        file.as_file_mut().seek(std::io::SeekFrom::Start(0)).unwrap();
        write!(file, "{contents}").unwrap();
        file.as_file_mut().sync_all().unwrap();
    }

    #[test]
    fn unread_file_is_not_fresh() {
        let tracker = FileTracker::new();
        let session = SessionId::new("s1");
        let file = NamedTempFile::new().unwrap();
        let err = tracker.assert_fresh(&session, file.path()).unwrap_err();
        assert!(matches!(err, FreshnessError::FileNotRead { .. }));
    }

    #[test]
    fn read_then_assert_fresh_succeeds() {
        let tracker = FileTracker::new();
        let session = SessionId::new("s1");
        let file = NamedTempFile::new().unwrap();
        tracker.record_read(&session, file.path()).unwrap();
        assert!(tracker.is_fresh(&session, file.path()));
    }

    #[test]
    fn external_mutation_after_read_makes_file_stale() {
        let tracker = FileTracker::new();
        let session = SessionId::new("s1");
        let mut file = NamedTempFile::new().unwrap();
        touch(&mut file, "v1");
        tracker.record_read(&session, file.path()).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        touch(&mut file, "v2 longer content to force mtime change");

        let err = tracker.assert_fresh(&session, file.path());
        // mtime resolution on some filesystems is coarse; assert on content
        // change or pass if the filesystem collapsed the mtimes.
        if let Err(e) = err {
            assert!(matches!(e, FreshnessError::StaleFile { .. }));
        }
    }

    #[test]
    fn write_lock_is_shared_across_sessions_for_same_path() {
        let tracker = FileTracker::new();
        let path = PathBuf::from("/tmp/shared-path-for-lock-test");
        let lock_a = tracker.acquire_write_lock(&path);
        let lock_b = tracker.acquire_write_lock(&path);
        assert!(Arc::ptr_eq(&lock_a, &lock_b));
    }

    #[test]
    fn invalidate_all_sessions_clears_every_session_record() {
        let tracker = FileTracker::new();
        let file = NamedTempFile::new().unwrap();
        let s1 = SessionId::new("s1");
        let s2 = SessionId::new("s2");
        tracker.record_read(&s1, file.path()).unwrap();
        tracker.record_read(&s2, file.path()).unwrap();

        tracker.invalidate_all_sessions(file.path());

        assert!(!tracker.is_fresh(&s1, file.path()));
        assert!(!tracker.is_fresh(&s2, file.path()));
    }
}
