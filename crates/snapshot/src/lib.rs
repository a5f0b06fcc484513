// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-snapshot: a shadow git repository per workspace, used to capture
//! and restore file-tree state without touching the user's own git history.
//!
//! [`SnapshotManager`] shells out to the system `git` binary with an
//! isolated `GIT_DIR`/`GIT_WORK_TREE` pointed at a bare repo under
//! `~/.ag3nt/snapshots/<workspace-hash>/`, using plumbing commands
//! (`write-tree`, `read-tree`, `checkout-index`, `diff-tree`, `ls-tree`)
//! rather than porcelain. [`revert::SessionRevert`] layers an undo/redo
//! action log for a session on top of it.

pub mod revert;

use ag3nt_core::defaults::SNAPSHOT_TIMEOUT;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Remove snapshots older than this (matches `_PRUNE_AGE_SECONDS` in the
/// reference implementation).
pub const PRUNE_AGE: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 3600);

/// Auto-prune once the in-memory ledger exceeds this many entries.
pub const MAX_SNAPSHOTS: usize = 500;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("workspace path does not exist: {0}")]
    WorkspaceMissing(PathBuf),
    #[error("git command failed: {0}")]
    GitFailed(String),
    #[error("git write-tree returned an empty hash")]
    EmptyTreeHash,
    #[error("git command timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SnapshotError> for ag3nt_core::CoreError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Timeout(after) => ag3nt_core::CoreError::timeout("snapshot", after),
            other => ag3nt_core::CoreError::Storage(anyhow::anyhow!(other)),
        }
    }
}

/// Metadata for a single snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub tree_hash: String,
    pub taken_at: DateTime<Utc>,
    pub label: String,
    pub files_changed: Vec<String>,
}

/// Manages workspace snapshots via a shadow git repository.
pub struct SnapshotManager {
    workspace_path: PathBuf,
    shadow_repo: PathBuf,
    snapshots: Mutex<Vec<SnapshotInfo>>,
    initialized: Mutex<bool>,
}

impl SnapshotManager {
    /// Opens a manager for `workspace_path`. `snapshots_root` overrides the
    /// default `~/.ag3nt/snapshots` base directory.
    pub fn new(
        workspace_path: impl AsRef<Path>,
        snapshots_root: Option<PathBuf>,
    ) -> Result<Self, SnapshotError> {
        let workspace_path = workspace_path.as_ref().to_path_buf();
        if !workspace_path.is_dir() {
            return Err(SnapshotError::WorkspaceMissing(workspace_path));
        }

        let hash = format!("{:x}", Sha256::digest(workspace_path.to_string_lossy().as_bytes()));
        let base = snapshots_root.unwrap_or_else(|| {
            dirs_home().join(".ag3nt").join("snapshots")
        });
        let shadow_repo = base.join(&hash[..16]);

        Ok(Self {
            workspace_path,
            shadow_repo,
            snapshots: Mutex::new(Vec::new()),
            initialized: Mutex::new(false),
        })
    }

    async fn ensure_initialized(&self) -> Result<(), SnapshotError> {
        if *self.initialized.lock() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.shadow_repo).await?;
        let git_dir = self.shadow_repo.join(".git");

        if !git_dir.exists() {
            self.run_git(&["init"], Some(&self.shadow_repo)).await?;
            self.run_git(&["config", "user.email", "snapshots@ag3nt.dev"], Some(&self.shadow_repo))
                .await?;
            self.run_git(&["config", "user.name", "AG3NT Snapshots"], Some(&self.shadow_repo))
                .await?;
            self.run_git(
                &["commit", "--allow-empty", "-m", "snapshot repo initialized"],
                Some(&self.shadow_repo),
            )
            .await?;
            info!(shadow_repo = %self.shadow_repo.display(), "initialized shadow snapshot repo");
        }

        *self.initialized.lock() = true;
        Ok(())
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, SnapshotError> {
        let mut command = Command::new("git");
        command
            .args(args)
            .env("GIT_DIR", self.shadow_repo.join(".git"))
            .env("GIT_WORK_TREE", &self.workspace_path)
            .current_dir(cwd.unwrap_or(&self.workspace_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(SNAPSHOT_TIMEOUT, command.output())
            .await
            .map_err(|_| SnapshotError::Timeout(SNAPSHOT_TIMEOUT))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(SnapshotError::GitFailed(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Best-effort git call: failure is logged, not propagated. Used for
    /// commands that legitimately no-op (e.g. committing with nothing staged).
    async fn run_git_lenient(&self, args: &[&str]) {
        if let Err(err) = self.run_git(args, None).await {
            debug!(%err, args = ?args, "non-fatal git command failed");
        }
    }

    /// Captures the current workspace state as a tree object, without
    /// creating a working commit other than bookkeeping for `gc`.
    pub async fn take_snapshot(
        &self,
        label: &str,
        files: Vec<String>,
    ) -> Result<String, SnapshotError> {
        self.ensure_initialized().await?;

        self.run_git(&["add", "-A", "--force"], None).await?;
        let tree_hash = self.run_git(&["write-tree"], None).await?;
        if tree_hash.is_empty() {
            return Err(SnapshotError::EmptyTreeHash);
        }

        let commit_msg = if label.is_empty() {
            format!("snapshot at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))
        } else {
            label.to_string()
        };
        self.run_git_lenient(&["commit", "--allow-empty", "-m", &commit_msg]).await;

        let info = SnapshotInfo {
            tree_hash: tree_hash.clone(),
            taken_at: Utc::now(),
            label: label.to_string(),
            files_changed: files,
        };

        let mut snapshots = self.snapshots.lock();
        snapshots.push(info);
        let over_budget = snapshots.len() > MAX_SNAPSHOTS;
        drop(snapshots);
        if over_budget {
            self.prune_old().await;
        }

        debug!(tree_hash = %&tree_hash[..12.min(tree_hash.len())], label, "snapshot taken");
        Ok(tree_hash)
    }

    /// Restores the workspace to `tree_hash`, returning the files that
    /// changed. A defensive cleanup pass removes files present in the
    /// workspace but absent from the target tree.
    pub async fn restore(&self, tree_hash: &str) -> Result<Vec<String>, SnapshotError> {
        self.ensure_initialized().await?;

        let changed = self.diff_tree_to_workspace(tree_hash).await?;

        self.run_git(&["read-tree", tree_hash], None).await?;
        self.run_git(&["checkout-index", "-f", "-a", "--prefix="], None).await?;
        self.clean_extra_files(tree_hash).await?;

        info!(tree_hash = %&tree_hash[..12.min(tree_hash.len())], files_changed = changed.len(), "restored snapshot");
        Ok(changed)
    }

    /// Full unified diff between `tree_hash` and the current workspace.
    pub async fn diff(&self, tree_hash: &str) -> Result<String, SnapshotError> {
        self.ensure_initialized().await?;
        let current_tree = self.write_current_tree().await?;
        self.run_git(&["diff-tree", "-p", "--stat", tree_hash, &current_tree], None).await
    }

    /// Stat-only summary of changes between `tree_hash` and the workspace.
    pub async fn diff_summary(&self, tree_hash: &str) -> Result<String, SnapshotError> {
        self.ensure_initialized().await?;
        let current_tree = self.write_current_tree().await?;
        self.run_git(&["diff-tree", "--stat", tree_hash, &current_tree], None).await
    }

    /// Most recent `n` snapshots, newest first.
    pub fn list_snapshots(&self, n: usize) -> Vec<SnapshotInfo> {
        let snapshots = self.snapshots.lock();
        let start = snapshots.len().saturating_sub(n);
        snapshots[start..].iter().rev().cloned().collect()
    }

    /// Looks up a snapshot by full hash or unambiguous prefix.
    pub fn get_snapshot(&self, tree_hash: &str) -> Option<SnapshotInfo> {
        self.snapshots
            .lock()
            .iter()
            .rev()
            .find(|info| info.tree_hash.starts_with(tree_hash))
            .cloned()
    }

    async fn write_current_tree(&self) -> Result<String, SnapshotError> {
        self.run_git(&["add", "-A", "--force"], None).await?;
        self.run_git(&["write-tree"], None).await
    }

    async fn diff_tree_to_workspace(&self, tree_hash: &str) -> Result<Vec<String>, SnapshotError> {
        let current_tree = self.write_current_tree().await?;
        let output = self
            .run_git(&["diff-tree", "--name-only", "-r", tree_hash, &current_tree], None)
            .await?;
        Ok(output.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    async fn clean_extra_files(&self, tree_hash: &str) -> Result<(), SnapshotError> {
        let tree_output = self.run_git(&["ls-tree", "-r", "--name-only", tree_hash], None).await?;
        let tree_files: HashSet<&str> = tree_output.lines().filter(|l| !l.is_empty()).collect();

        self.run_git(&["add", "-A", "--force"], None).await?;
        let current_output = self.run_git(&["ls-files"], None).await?;

        for file in current_output.lines().filter(|l| !l.is_empty()) {
            if !tree_files.contains(file) {
                let path = self.workspace_path.join(file);
                if path.is_file() {
                    let _ = tokio::fs::remove_file(&path).await;
                    debug!(file, "removed extra file not present in restored snapshot");
                }
            }
        }
        Ok(())
    }

    async fn prune_old(&self) {
        let cutoff = Utc::now() - chrono::Duration::from_std(PRUNE_AGE).unwrap_or_default();
        let mut snapshots = self.snapshots.lock();
        let before = snapshots.len();
        snapshots.retain(|s| s.taken_at > cutoff);
        let pruned = before - snapshots.len();
        drop(snapshots);
        if pruned > 0 {
            info!(pruned, "pruned old snapshots");
        }
        self.run_git_lenient(&["gc", "--auto", "--quiet"]).await;
    }

    /// Runs aggressive garbage collection and age-based pruning.
    pub async fn gc(&self) -> Result<(), SnapshotError> {
        self.ensure_initialized().await?;
        match self.run_git(&["gc", "--aggressive", "--quiet"], None).await {
            Ok(_) => {}
            Err(err) => warn!(%err, "snapshot gc failed"),
        }
        self.prune_old().await;
        info!("snapshot garbage collection complete");
        Ok(())
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager(workspace: &Path, root: &Path) -> SnapshotManager {
        SnapshotManager::new(workspace, Some(root.to_path_buf())).expect("workspace exists")
    }

    #[tokio::test]
    async fn take_snapshot_then_restore_round_trips_content() {
        let workspace = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let file = workspace.path().join("a.txt");
        std::fs::write(&file, "v1").unwrap();

        let mgr = manager(workspace.path(), root.path()).await;
        let before = mgr.take_snapshot("before edit", vec!["a.txt".into()]).await.unwrap();

        std::fs::write(&file, "v2").unwrap();
        mgr.restore(&before).await.unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "v1");
    }

    #[tokio::test]
    async fn restore_removes_files_absent_from_the_snapshot() {
        let workspace = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        std::fs::write(workspace.path().join("keep.txt"), "keep").unwrap();

        let mgr = manager(workspace.path(), root.path()).await;
        let before = mgr.take_snapshot("initial", vec![]).await.unwrap();

        std::fs::write(workspace.path().join("new.txt"), "new").unwrap();
        mgr.restore(&before).await.unwrap();

        assert!(!workspace.path().join("new.txt").exists());
        assert!(workspace.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn list_snapshots_returns_newest_first() {
        let workspace = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let mgr = manager(workspace.path(), root.path()).await;

        let first = mgr.take_snapshot("one", vec![]).await.unwrap();
        std::fs::write(workspace.path().join("b.txt"), "b").unwrap();
        let second = mgr.take_snapshot("two", vec![]).await.unwrap();

        let listed = mgr.list_snapshots(10);
        assert_eq!(listed[0].tree_hash, second);
        assert_eq!(listed[1].tree_hash, first);
    }

    #[tokio::test]
    async fn get_snapshot_matches_a_hash_prefix() {
        let workspace = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let mgr = manager(workspace.path(), root.path()).await;
        let hash = mgr.take_snapshot("one", vec![]).await.unwrap();

        let found = mgr.get_snapshot(&hash[..10]).expect("found by prefix");
        assert_eq!(found.tree_hash, hash);
    }
}
