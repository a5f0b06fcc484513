// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeout and sizing constants shared across subsystems.

use std::time::Duration;

/// Ceiling on a snapshot take/restore/diff subprocess call.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling on an LSP round-trip used by tool validation.
pub const LSP_TIMEOUT: Duration = Duration::from_secs(5);

/// Ceiling on a single tool call.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Ceiling on a shell subprocess spawned through exec approval.
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default event-bus dedup window.
pub const EVENT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Default tool-result cache TTL.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Maximum bytes a file read tool may return.
pub const MAX_READ_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum bytes a file write tool may accept.
pub const MAX_WRITE_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Maximum bytes a single artifact may occupy on disk.
pub const MAX_ARTIFACT_SIZE_BYTES: u64 = 10 * 1024 * 1024;
