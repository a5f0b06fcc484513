// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-runtime: wires every leaf collaborator crate into one turn.
//! [`controller`] drives the model/tool iteration loop; [`registry`]
//! resolves the tool list once per turn; [`patch`] implements the
//! `apply_patch` tool body; [`autonomy_runtime`] breaks the event-bus /
//! decision-engine / goal-manager cycle into one-directional dispatch;
//! [`cancel`] is the cooperative cancellation token threaded through every
//! suspending call; [`collaborators`] and [`llm`] hold the collaborator
//! traits (file watcher, LLM client) that have no home in a leaf crate;
//! [`error`] aggregates every leaf error type at the turn boundary.

pub mod autonomy_runtime;
pub mod cancel;
pub mod collaborators;
pub mod controller;
pub mod error;
pub mod llm;
pub mod patch;
pub mod registry;
pub mod tool;

pub use autonomy_runtime::{install as install_autonomy_runtime, ActionDispatcher, GoalEvaluator, Notifier};
pub use cancel::CancellationToken;
pub use collaborators::FileWatcher;
pub use controller::{TurnController, TurnResult};
pub use error::RuntimeError;
pub use llm::{AssistantReply, ChatMessage, LlmClient, Role};
pub use patch::{FilePatch, PatchApplier, PatchError, PatchParser, PatchResult};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolDefinition, ToolOutcome, PATH_ARG_KEYS};
