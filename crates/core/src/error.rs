// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error kinds surfaced across every subsystem.
//!
//! Leaf crates define their own `thiserror` enums for internal detail and
//! provide a `From` conversion into [`CoreError`] so that collaborators at
//! the [`crate::lib`] boundary can match on kind without depending on every
//! leaf crate's error type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The eight error kinds every subsystem propagates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{resource} is not ready")]
    NotReady { resource: String },

    #[error("stale state for {path}: read at {read_at}")]
    StaleState {
        path: PathBuf,
        read_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("security blocked: {reason}")]
    SecurityBlocked {
        reason: String,
        matched_rule: Option<String>,
    },

    #[error("quota exceeded for {what}: {actual}/{limit}")]
    Quota {
        what: String,
        limit: u64,
        actual: u64,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn not_ready(resource: impl Into<String>) -> Self {
        Self::NotReady {
            resource: resource.into(),
        }
    }

    pub fn security_blocked(reason: impl Into<String>, matched_rule: Option<String>) -> Self {
        Self::SecurityBlocked {
            reason: reason.into(),
            matched_rule,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// True for kinds that are safe to retry without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NotReady { .. })
    }
}
