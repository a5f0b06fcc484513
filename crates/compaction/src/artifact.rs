// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed store for large tool output moved off the hot path
//! by the masking stage, or written directly by tools that produce
//! output too large to keep inline.

use ag3nt_core::defaults::MAX_ARTIFACT_SIZE_BYTES;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("content exceeds maximum artifact size of {max} bytes")]
    TooLarge { max: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("artifact not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub artifact_id: String,
    pub tool_name: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub source_url: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArtifactStats {
    pub total_artifacts: usize,
    pub total_size_bytes: u64,
}

pub struct ArtifactStore {
    dir: PathBuf,
    metadata: Mutex<Vec<ArtifactMeta>>,
}

impl ArtifactStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        std::fs::create_dir_all(dir.join("content"))?;
        let metadata = Self::load_metadata(&dir)?;
        Ok(Self {
            dir,
            metadata: Mutex::new(metadata),
        })
    }

    fn metadata_path(dir: &Path) -> PathBuf {
        dir.join("metadata.jsonl")
    }

    fn load_metadata(dir: &Path) -> Result<Vec<ArtifactMeta>, ArtifactError> {
        let path = Self::metadata_path(dir);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ArtifactMeta>(line) {
                Ok(meta) => entries.push(meta),
                Err(err) => {
                    tracing::warn!(%err, "skipping corrupt artifact metadata line");
                }
            }
        }
        Ok(entries)
    }

    /// Writes `content`, deduplicating by content hash against everything
    /// already in the store.
    pub fn write_artifact(
        &self,
        tool_name: &str,
        content: &str,
        session_id: Option<String>,
        tags: Vec<String>,
    ) -> Result<ArtifactMeta, ArtifactError> {
        if content.len() as u64 > MAX_ARTIFACT_SIZE_BYTES {
            return Err(ArtifactError::TooLarge {
                max: MAX_ARTIFACT_SIZE_BYTES,
            });
        }

        let hash = format!("{:x}", Sha256::digest(content.as_bytes()));

        let mut metadata = self.metadata.lock();
        if let Some(existing) = metadata.iter().find(|m| m.content_hash == hash) {
            return Ok(existing.clone());
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let artifact_id = format!("{}_{:x}", &hash[..12], millis);

        std::fs::write(self.dir.join("content").join(format!("{artifact_id}.txt")), content)?;

        let meta = ArtifactMeta {
            artifact_id,
            tool_name: tool_name.to_string(),
            content_hash: hash,
            size_bytes: content.len() as u64,
            created_at: Utc::now(),
            source_url: None,
            session_id,
            tags,
        };

        self.append_metadata(&meta)?;
        metadata.push(meta.clone());
        Ok(meta)
    }

    fn append_metadata(&self, meta: &ArtifactMeta) -> Result<(), ArtifactError> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::metadata_path(&self.dir))?;
        writeln!(file, "{}", serde_json::to_string(meta)?)?;
        Ok(())
    }

    pub fn read_artifact(&self, artifact_id: &str) -> Result<String, ArtifactError> {
        let path = self.dir.join("content").join(format!("{artifact_id}.txt"));
        std::fs::read_to_string(&path)
            .map_err(|_| ArtifactError::NotFound(artifact_id.to_string()))
    }

    pub fn get_meta(&self, artifact_id: &str) -> Option<ArtifactMeta> {
        self.metadata
            .lock()
            .iter()
            .find(|m| m.artifact_id == artifact_id)
            .cloned()
    }

    pub fn delete_artifact(&self, artifact_id: &str) -> Result<(), ArtifactError> {
        let path = self.dir.join("content").join(format!("{artifact_id}.txt"));
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        self.metadata.lock().retain(|m| m.artifact_id != artifact_id);
        Ok(())
    }

    /// Deletes artifacts older than `max_age_days` and compacts the
    /// on-disk ledger to match the surviving in-memory set.
    pub fn cleanup_stale(&self, max_age_days: i64) -> Result<usize, ArtifactError> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let mut metadata = self.metadata.lock();
        let (stale, fresh): (Vec<_>, Vec<_>) =
            metadata.drain(..).partition(|m| m.created_at < cutoff);

        for meta in &stale {
            let path = self.dir.join("content").join(format!("{}.txt", meta.artifact_id));
            let _ = std::fs::remove_file(path);
        }
        *metadata = fresh;
        self.rewrite_metadata(&metadata)?;
        Ok(stale.len())
    }

    fn rewrite_metadata(&self, metadata: &[ArtifactMeta]) -> Result<(), ArtifactError> {
        let mut body = String::new();
        for meta in metadata {
            body.push_str(&serde_json::to_string(meta)?);
            body.push('\n');
        }
        std::fs::write(Self::metadata_path(&self.dir), body)?;
        Ok(())
    }

    /// Lists artifact metadata, newest first, optionally filtered by tool
    /// name or session id, capped at `limit`.
    pub fn list_artifacts(
        &self,
        tool_name: Option<&str>,
        session_id: Option<&str>,
        limit: usize,
    ) -> Vec<ArtifactMeta> {
        let metadata = self.metadata.lock();
        let mut matches: Vec<ArtifactMeta> = metadata
            .iter()
            .filter(|m| tool_name.is_none_or(|t| m.tool_name == t))
            .filter(|m| session_id.is_none_or(|s| m.session_id.as_deref() == Some(s)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        matches
    }

    pub fn stats(&self) -> ArtifactStats {
        let metadata = self.metadata.lock();
        ArtifactStats {
            total_artifacts: metadata.len(),
            total_size_bytes: metadata.iter().map(|m| m.size_bytes).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let meta = store
            .write_artifact("grep_tool", "line one\nline two", None, vec![])
            .unwrap();
        assert_eq!(store.read_artifact(&meta.artifact_id).unwrap(), "line one\nline two");
    }

    #[test]
    fn identical_content_is_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let a = store.write_artifact("grep_tool", "same", None, vec![]).unwrap();
        let b = store.write_artifact("glob_tool", "same", None, vec![]).unwrap();
        assert_eq!(a.artifact_id, b.artifact_id);
        assert_eq!(store.stats().total_artifacts, 1);
    }

    #[test]
    fn oversized_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let huge = "x".repeat((MAX_ARTIFACT_SIZE_BYTES + 1) as usize);
        let err = store.write_artifact("read_file", &huge, None, vec![]).unwrap_err();
        assert!(matches!(err, ArtifactError::TooLarge { .. }));
    }

    #[test]
    fn cleanup_stale_removes_old_entries_and_compacts_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let meta = store.write_artifact("grep_tool", "old content", None, vec![]).unwrap();

        // Force the entry to look old by rewriting its metadata directly.
        {
            let mut metadata = store.metadata.lock();
            metadata[0].created_at = Utc::now() - chrono::Duration::days(60);
        }

        let removed = store.cleanup_stale(30).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_meta(&meta.artifact_id).is_none());
    }

    #[test]
    fn list_artifacts_filters_by_tool_name_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        store.write_artifact("grep_tool", "a", None, vec![]).unwrap();
        store.write_artifact("glob_tool", "b", None, vec![]).unwrap();
        store.write_artifact("grep_tool", "c", None, vec![]).unwrap();

        let grep_only = store.list_artifacts(Some("grep_tool"), None, 10);
        assert_eq!(grep_only.len(), 2);
        assert!(grep_only.iter().all(|m| m.tool_name == "grep_tool"));

        let limited = store.list_artifacts(None, None, 1);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn corrupt_metadata_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("content")).unwrap();
        std::fs::write(dir.path().join("metadata.jsonl"), "not json\n").unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        assert_eq!(store.stats().total_artifacts, 0);
    }
}
