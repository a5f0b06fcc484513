// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregated error type for the turn boundary. Leaf crates keep their own
//! `thiserror` enums for internal detail; everything that can surface out
//! of a turn gets folded into [`RuntimeError`] here, mirroring the
//! `ExecuteError` → `RuntimeError` aggregation pattern.

use ag3nt_blueprint::{BlueprintError, TodoError};
use ag3nt_core::CoreError;
use ag3nt_freshness::FreshnessError;
use ag3nt_snapshot::SnapshotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("freshness error: {0}")]
    Freshness(#[from] FreshnessError),

    #[error("blueprint error: {0}")]
    Blueprint(#[from] BlueprintError),

    #[error("todo error: {0}")]
    Todo(#[from] TodoError),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool '{tool}' denied by policy")]
    ToolDenied { tool: String },

    #[error("tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error("turn was cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// True for kinds that are safe to retry without operator intervention,
    /// delegating to [`CoreError::is_retryable`] where one is wrapped.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Core(err) => err.is_retryable(),
            _ => false,
        }
    }
}
