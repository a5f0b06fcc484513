// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator contracts that don't already live in a leaf crate.
//! `ag3nt-pool::AgentBuilder` and `ag3nt-autonomy::LearningStore` are
//! reused as-is; this module adds the file-watcher contract, which has
//! no other natural home since it drives `ag3nt-freshness` from outside
//! a turn.

use ag3nt_freshness::FileTracker;
use async_trait::async_trait;
use std::sync::Arc;

/// Notified by an external filesystem watcher when a tracked path
/// changes outside the agent's own writes. Implementations call
/// [`FileTracker::invalidate_all_sessions`] for the changed path; the
/// watch loop itself (inotify, polling, ...) is outside this crate.
#[async_trait]
pub trait FileWatcher: Send + Sync {
    async fn run(&self, tracker: Arc<FileTracker>);
}
