// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session undo/redo over [`crate::SnapshotManager`].
//!
//! [`SessionRevert`] keeps an ordered action log per session. `undo_last`
//! and `revert_to` both snapshot the *current* state before restoring, so
//! the restore can always be undone with `unrevert`.

use crate::SnapshotManager;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// A single file-modifying action recorded within a session.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub tool_call_id: String,
    /// Tree hash of the workspace state immediately before this action.
    pub snapshot_before: String,
    pub recorded_at: DateTime<Utc>,
    pub files: Vec<String>,
    pub tool_name: String,
    pub label: String,
}

#[derive(Debug, Default)]
struct RevertState {
    actions: Vec<ActionRecord>,
    undo_stack: Vec<String>,
}

/// Outcome of an undo/revert/unrevert call.
#[derive(Debug, Clone)]
pub struct RevertResult {
    pub success: bool,
    pub message: String,
    pub files_changed: Vec<String>,
    pub snapshot_hash: String,
}

impl RevertResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            files_changed: Vec::new(),
            snapshot_hash: String::new(),
        }
    }
}

/// A single action entry as exposed by [`SessionRevert::list_actions`].
#[derive(Debug, Clone)]
pub struct ActionSummary {
    pub tool_call_id: String,
    pub tool_name: String,
    pub files: Vec<String>,
    pub recorded_at: DateTime<Utc>,
    pub label: String,
    pub snapshot_prefix: String,
}

/// Coordinates undo/revert/unrevert across sessions sharing one
/// [`SnapshotManager`].
pub struct SessionRevert {
    snapshots: Arc<SnapshotManager>,
    sessions: Mutex<HashMap<String, RevertState>>,
}

impl SessionRevert {
    pub fn new(snapshots: Arc<SnapshotManager>) -> Self {
        Self {
            snapshots,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Records a file-modifying action. Must be called with the tree hash
    /// from a snapshot taken *before* the modification happened. Starting a
    /// new action clears any pending unrevert, since it invalidates the
    /// reverted-state history.
    pub fn record_action(
        &self,
        session_id: &str,
        tool_call_id: &str,
        files: Vec<String>,
        snapshot_before: String,
        tool_name: &str,
        label: &str,
    ) {
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session_id.to_string()).or_default();
        state.actions.push(ActionRecord {
            tool_call_id: tool_call_id.to_string(),
            snapshot_before,
            recorded_at: Utc::now(),
            files: files.clone(),
            tool_name: tool_name.to_string(),
            label: label.to_string(),
        });
        state.undo_stack.clear();
        debug!(session_id, tool_call_id, tool_name, ?files, "recorded revertible action");
    }

    /// Undoes the most recent action: snapshots the current state (so
    /// `unrevert` can recover it), restores the state from before the last
    /// action, then pops it from the log.
    pub async fn undo_last(&self, session_id: &str) -> RevertResult {
        let last_action = {
            let sessions = self.sessions.lock();
            match sessions.get(session_id).and_then(|s| s.actions.last()) {
                Some(action) => action.clone(),
                None => {
                    return RevertResult::failure(
                        "Nothing to undo — no file-modifying actions recorded in this session.",
                    )
                }
            }
        };

        let label = format!("before undo of {} ({})", last_action.tool_name, last_action.tool_call_id);
        let current_snapshot = match self.snapshots.take_snapshot(&label, vec![]).await {
            Ok(hash) => hash,
            Err(err) => {
                error!(%err, session_id, "undo failed while snapshotting current state");
                return RevertResult::failure(format!("Undo failed: {err}"));
            }
        };

        match self.snapshots.restore(&last_action.snapshot_before).await {
            Ok(changed) => {
                let mut sessions = self.sessions.lock();
                let state = sessions.entry(session_id.to_string()).or_default();
                state.undo_stack.push(current_snapshot);
                state.actions.pop();
                RevertResult {
                    success: true,
                    message: format!(
                        "Undone: {} (tool call {}). {} file(s) restored.",
                        if last_action.tool_name.is_empty() { "action" } else { &last_action.tool_name },
                        last_action.tool_call_id,
                        changed.len(),
                    ),
                    files_changed: changed,
                    snapshot_hash: last_action.snapshot_before,
                }
            }
            Err(err) => {
                error!(%err, session_id, "undo failed while restoring");
                RevertResult::failure(format!("Undo failed: {err}"))
            }
        }
    }

    /// Reverts the workspace to the state before `tool_call_id`, undoing
    /// every action from that point onward.
    pub async fn revert_to(&self, session_id: &str, tool_call_id: &str) -> RevertResult {
        let (target_action, actions_to_undo, target_idx) = {
            let sessions = self.sessions.lock();
            let Some(state) = sessions.get(session_id) else {
                return RevertResult::failure(format!(
                    "Tool call '{tool_call_id}' not found in session history."
                ));
            };
            match state.actions.iter().position(|a| a.tool_call_id == tool_call_id) {
                Some(idx) => (state.actions[idx].clone(), state.actions.len() - idx, idx),
                None => {
                    return RevertResult::failure(format!(
                        "Tool call '{tool_call_id}' not found in session history."
                    ))
                }
            }
        };

        let label = format!("before revert to {tool_call_id}");
        let current_snapshot = match self.snapshots.take_snapshot(&label, vec![]).await {
            Ok(hash) => hash,
            Err(err) => {
                error!(%err, session_id, "revert failed while snapshotting current state");
                return RevertResult::failure(format!("Revert failed: {err}"));
            }
        };

        match self.snapshots.restore(&target_action.snapshot_before).await {
            Ok(changed) => {
                let mut sessions = self.sessions.lock();
                let state = sessions.entry(session_id.to_string()).or_default();
                state.undo_stack.push(current_snapshot);
                state.actions.truncate(target_idx);
                RevertResult {
                    success: true,
                    message: format!(
                        "Reverted {actions_to_undo} action(s) back to before {} (tool call {tool_call_id}). {} file(s) restored.",
                        if target_action.tool_name.is_empty() { "action" } else { &target_action.tool_name },
                        changed.len(),
                    ),
                    files_changed: changed,
                    snapshot_hash: target_action.snapshot_before,
                }
            }
            Err(err) => {
                error!(%err, session_id, "revert failed while restoring");
                RevertResult::failure(format!("Revert failed: {err}"))
            }
        }
    }

    /// Re-applies the most recently undone/reverted changes.
    pub async fn unrevert(&self, session_id: &str) -> RevertResult {
        let restore_hash = {
            let mut sessions = self.sessions.lock();
            let state = sessions.entry(session_id.to_string()).or_default();
            match state.undo_stack.pop() {
                Some(hash) => hash,
                None => {
                    return RevertResult::failure(
                        "Nothing to unrevert — no previous undo/revert in this session.",
                    )
                }
            }
        };

        match self.snapshots.restore(&restore_hash).await {
            Ok(changed) => RevertResult {
                success: true,
                message: format!(
                    "Unrevert complete. {} file(s) restored to post-change state.",
                    changed.len()
                ),
                files_changed: changed,
                snapshot_hash: restore_hash,
            },
            Err(err) => {
                error!(%err, session_id, "unrevert failed, restoring to undo stack for retry");
                let mut sessions = self.sessions.lock();
                sessions.entry(session_id.to_string()).or_default().undo_stack.push(restore_hash);
                RevertResult::failure(format!("Unrevert failed: {err}"))
            }
        }
    }

    /// Most recent `n` actions for a session, newest first.
    pub fn list_actions(&self, session_id: &str, n: usize) -> Vec<ActionSummary> {
        let sessions = self.sessions.lock();
        let Some(state) = sessions.get(session_id) else {
            return Vec::new();
        };
        let start = state.actions.len().saturating_sub(n);
        state.actions[start..]
            .iter()
            .rev()
            .map(|a| ActionSummary {
                tool_call_id: a.tool_call_id.clone(),
                tool_name: a.tool_name.clone(),
                files: a.files.clone(),
                recorded_at: a.recorded_at,
                label: a.label.clone(),
                snapshot_prefix: a.snapshot_before.chars().take(12).collect(),
            })
            .collect()
    }

    pub fn can_undo(&self, session_id: &str) -> bool {
        self.sessions.lock().get(session_id).is_some_and(|s| !s.actions.is_empty())
    }

    pub fn can_unrevert(&self, session_id: &str) -> bool {
        self.sessions.lock().get(session_id).is_some_and(|s| !s.undo_stack.is_empty())
    }

    /// Drops all revert state for a session (e.g. on session close).
    pub fn clear_session(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
        debug!(session_id, "cleared revert state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn harness() -> (tempfile::TempDir, tempfile::TempDir, SessionRevert) {
        let workspace = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let mgr = Arc::new(SnapshotManager::new(workspace.path(), Some(root.path().to_path_buf())).unwrap());
        let revert = SessionRevert::new(mgr);
        (workspace, root, revert)
    }

    #[tokio::test]
    async fn undo_last_restores_state_before_the_action() {
        let (workspace, _root, revert) = harness().await;
        let file = workspace.path().join("f.txt");
        std::fs::write(&file, "v1").unwrap();

        let before = revert.snapshots.take_snapshot("before edit", vec![]).await.unwrap();
        std::fs::write(&file, "v2").unwrap();
        revert.record_action("s1", "tc-1", vec!["f.txt".into()], before, "write_file", "edit f.txt");

        let result = revert.undo_last("s1").await;
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "v1");
        assert!(!revert.can_undo("s1"));
    }

    #[tokio::test]
    async fn unrevert_reapplies_the_undone_change() {
        let (workspace, _root, revert) = harness().await;
        let file = workspace.path().join("f.txt");
        std::fs::write(&file, "v1").unwrap();
        let before = revert.snapshots.take_snapshot("before edit", vec![]).await.unwrap();
        std::fs::write(&file, "v2").unwrap();
        revert.record_action("s1", "tc-1", vec![], before, "write_file", "");

        revert.undo_last("s1").await;
        assert!(revert.can_unrevert("s1"));

        let result = revert.unrevert("s1").await;
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "v2");
    }

    #[tokio::test]
    async fn revert_to_drops_target_action_and_everything_after() {
        let (workspace, _root, revert) = harness().await;
        let file = workspace.path().join("f.txt");

        std::fs::write(&file, "v0").unwrap();
        let before_1 = revert.snapshots.take_snapshot("s0", vec![]).await.unwrap();
        std::fs::write(&file, "v1").unwrap();
        revert.record_action("s1", "tc-1", vec![], before_1, "write_file", "");

        let before_2 = revert.snapshots.take_snapshot("s1", vec![]).await.unwrap();
        std::fs::write(&file, "v2").unwrap();
        revert.record_action("s1", "tc-2", vec![], before_2, "write_file", "");

        let result = revert.revert_to("s1", "tc-1").await;
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "v0");
        assert_eq!(revert.list_actions("s1", 10).len(), 0);
    }

    #[tokio::test]
    async fn undo_last_with_no_actions_reports_failure() {
        let (_workspace, _root, revert) = harness().await;
        let result = revert.undo_last("empty-session").await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn clear_session_removes_recorded_actions() {
        let (workspace, _root, revert) = harness().await;
        std::fs::write(workspace.path().join("f.txt"), "v1").unwrap();
        let before = revert.snapshots.take_snapshot("s0", vec![]).await.unwrap();
        revert.record_action("s1", "tc-1", vec![], before, "write_file", "");
        assert!(revert.can_undo("s1"));

        revert.clear_session("s1");
        assert!(!revert.can_undo("s1"));
    }
}
