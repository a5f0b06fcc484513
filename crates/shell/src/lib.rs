// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-shell: classifies a shell command as allow/ask/deny without an
//! LLM call, so only genuinely ambiguous commands interrupt the agent
//! loop for human approval.
//!
//! The evaluator runs a fixed seven-step algorithm (see [`classify`] for
//! the full ladder): deny patterns, global ask-mode overrides, a user
//! allowlist, then a per-pipeline-component safe-binary/safe-git/version-
//! flag check. [`pipeline`] owns the two-phase command splitting
//! (`&&`/`||`/`;` chains, then `|` pipes) that step feeds on.

pub mod classify;
pub mod pipeline;
pub mod span;

pub use classify::{AskMode, Decision, ExecApprovalEvaluator, ExecApprovalResult, ExecPolicy};
pub use pipeline::{extract_base_command, split_pipeline};
pub use span::Span;
