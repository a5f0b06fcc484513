// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guards against writes outside the workspace root. Paths inside the
//! root are always allowed; paths outside require per-directory approval,
//! cached per session so the user is only asked once per external
//! directory.

use ag3nt_core::id::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut result = PathBuf::new();
    for component in absolute.components() {
        match component {
            std::path::Component::ParentDir => {
                result.pop();
            }
            std::path::Component::CurDir => {}
            other => result.push(other.as_os_str()),
        }
    }
    result
}

pub struct PathProtection {
    workspace_root: Mutex<Option<PathBuf>>,
    approvals: Mutex<HashMap<SessionId, HashMap<PathBuf, bool>>>,
}

impl Default for PathProtection {
    fn default() -> Self {
        Self::new()
    }
}

impl PathProtection {
    pub fn new() -> Self {
        Self {
            workspace_root: Mutex::new(None),
            approvals: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_workspace_root(&self, root: impl AsRef<Path>) {
        *self.workspace_root.lock() = Some(normalize(root.as_ref()));
    }

    /// With no workspace root configured, every path is considered
    /// in-bounds.
    pub fn is_within_workspace(&self, path: impl AsRef<Path>) -> bool {
        let workspace = self.workspace_root.lock();
        match workspace.as_ref() {
            None => true,
            Some(root) => normalize(path.as_ref()).starts_with(root),
        }
    }

    /// Returns `(true, "")` when access is allowed, or `(false, message)`
    /// with a human-readable explanation otherwise.
    pub fn check_path(&self, path: impl AsRef<Path>, session_id: &SessionId, operation: &str) -> (bool, String) {
        let path = path.as_ref();
        let workspace = self.workspace_root.lock().clone();
        let Some(workspace) = workspace else {
            return (true, String::new());
        };

        if self.is_within_workspace(path) {
            return (true, String::new());
        }

        let normalized = normalize(path);
        let dir_path = normalized.parent().map(Path::to_path_buf).unwrap_or(normalized.clone());

        let cached = self
            .approvals
            .lock()
            .get(session_id)
            .and_then(|dirs| dirs.get(&dir_path))
            .copied();

        match cached {
            Some(true) => (true, String::new()),
            Some(false) => (
                false,
                format!("Access to '{}' outside the project was previously denied.", dir_path.display()),
            ),
            None => (
                false,
                format!(
                    "Agent wants to {} '{}' which is outside the project workspace ({}). Allow access to '{}'?",
                    operation,
                    path.display(),
                    workspace.display(),
                    dir_path.display()
                ),
            ),
        }
    }

    pub fn record_approval(&self, session_id: &SessionId, path: impl AsRef<Path>, approved: bool) {
        let normalized = normalize(path.as_ref());
        let dir_path = normalized.parent().map(Path::to_path_buf).unwrap_or(normalized);
        self.approvals
            .lock()
            .entry(session_id.clone())
            .or_default()
            .insert(dir_path, approved);
    }

    pub fn clear_session(&self, session_id: &SessionId) {
        self.approvals.lock().remove(session_id);
    }
}
