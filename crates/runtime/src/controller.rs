// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The turn controller: drives one model/tool iteration loop for a
//! session, threading every tool call through the policy, freshness,
//! snapshot, and cache collaborators before it reaches a tool body.
//!
//! A turn's tool list is resolved once, at the top of [`TurnController::run_turn`],
//! from the registry plus the active policy; nothing mutates it while the
//! turn is in flight, per the no-dynamic-dispatch-mid-turn design note.

use crate::cancel::CancellationToken;
use crate::error::RuntimeError;
use crate::llm::{AssistantReply, ChatMessage, LlmClient, Role};
use crate::patch::{PatchApplier, PatchParser};
use crate::registry::ToolRegistry;
use crate::tool::{extract_path_arg, ToolOutcome};
use ag3nt_cache::ToolResultCache;
use ag3nt_compaction::CompactionMiddleware;
use ag3nt_core::defaults::TOOL_TIMEOUT;
use ag3nt_core::id::SessionId;
use ag3nt_policy::{is_write_operation, FileSecurityValidator, PathProtection, ToolPolicyManager};
use ag3nt_pool::{AgentBuilder, AgentPool};
use ag3nt_shell::{Decision as ShellDecision, ExecApprovalEvaluator};
use ag3nt_snapshot::revert::SessionRevert;
use ag3nt_snapshot::SnapshotManager;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Tools classified as shell execution, gated by [`ExecApprovalEvaluator`]
/// rather than (or in addition to) the filesystem checks below.
const SHELL_TOOLS: &[&str] = &["exec_command", "shell", "execute", "bash", "sandbox_run_command"];

/// Outcome of one full turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub reply: AssistantReply,
    pub messages: Vec<ChatMessage>,
    pub tool_calls_executed: usize,
}

/// Wires every collaborator a turn needs to touch. Constructed once per
/// process (or per workspace) and shared across turns/sessions.
pub struct TurnController<A, B: AgentBuilder<A>> {
    pool: Arc<AgentPool<A, B>>,
    registry: Arc<ToolRegistry>,
    tool_policy: Arc<ToolPolicyManager>,
    path_protection: Arc<PathProtection>,
    file_security: Arc<FileSecurityValidator>,
    shell_policy: Arc<ExecApprovalEvaluator>,
    freshness: Arc<ag3nt_freshness::FileTracker>,
    cache: Arc<ToolResultCache>,
    snapshots: Arc<SnapshotManager>,
    revert: Arc<SessionRevert>,
    compaction: Arc<CompactionMiddleware>,
    patch_applier: PatchApplier,
    max_tool_iterations: usize,
}

impl<A, B> TurnController<A, B>
where
    A: AsRef<dyn LlmClient> + Send + 'static,
    B: AgentBuilder<A> + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<AgentPool<A, B>>,
        registry: Arc<ToolRegistry>,
        tool_policy: Arc<ToolPolicyManager>,
        path_protection: Arc<PathProtection>,
        file_security: Arc<FileSecurityValidator>,
        shell_policy: Arc<ExecApprovalEvaluator>,
        freshness: Arc<ag3nt_freshness::FileTracker>,
        cache: Arc<ToolResultCache>,
        snapshots: Arc<SnapshotManager>,
        revert: Arc<SessionRevert>,
        compaction: Arc<CompactionMiddleware>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        path_protection.set_workspace_root(&workspace_root);
        Self {
            pool,
            registry,
            tool_policy,
            path_protection,
            file_security,
            shell_policy,
            freshness,
            cache,
            snapshots,
            revert,
            compaction,
            patch_applier: PatchApplier::new(workspace_root),
            max_tool_iterations: 25,
        }
    }

    /// Drives `messages` through model/tool iterations until the model
    /// returns a reply with no further tool calls, the iteration cap is
    /// hit, or `cancel` fires. On cancellation the pool entry is still
    /// released (never stranded) and [`RuntimeError::Cancelled`] is
    /// returned with whatever messages were appended so far discarded.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        mut messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<TurnResult, RuntimeError> {
        let entry = self.pool.acquire().await.map_err(RuntimeError::Collaborator)?;
        let result = self.drive_turn(session_id, &mut messages, &entry.agent, &cancel).await;
        self.pool.release(entry);
        let (reply, tool_calls_executed) = result?;

        let mut compaction_view = to_compaction_messages(&messages);
        let metrics = self.compaction.compact_for_session(&mut compaction_view, Some(session_id.as_str()));
        if metrics.chunks_summarized > 0 || metrics.artifacts_created > 0 {
            info!(
                session_id = %session_id,
                tokens_before = metrics.tokens_before,
                tokens_after = metrics.tokens_after,
                "compaction ran for session"
            );
            messages = from_compaction_messages(compaction_view);
        }

        Ok(TurnResult {
            reply,
            messages,
            tool_calls_executed,
        })
    }

    async fn drive_turn(
        &self,
        session_id: &SessionId,
        messages: &mut Vec<ChatMessage>,
        agent: &A,
        cancel: &CancellationToken,
    ) -> Result<(AssistantReply, usize), RuntimeError> {
        let policy = self.tool_policy.load_policy();
        let tool_defs = self.registry.resolve_for_policy(&policy);
        let llm: &dyn LlmClient = agent.as_ref();

        let mut tool_calls_executed = 0;
        for _ in 0..self.max_tool_iterations {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                reply = llm.complete(messages, &tool_defs) => reply,
            }
            .map_err(RuntimeError::Collaborator)?;

            if reply.is_final() {
                messages.push(ChatMessage {
                    role: Role::Assistant,
                    content: reply.content.clone(),
                    tool_call_id: None,
                    tool_calls: Vec::new(),
                    tool_name: None,
                });
                return Ok((reply, tool_calls_executed));
            }

            messages.push(ChatMessage {
                role: Role::Assistant,
                content: reply.content.clone(),
                tool_call_id: None,
                tool_calls: reply.tool_calls.clone(),
                tool_name: None,
            });

            for call in &reply.tool_calls {
                if cancel.is_cancelled() {
                    return Err(RuntimeError::Cancelled);
                }
                let outcome = self
                    .dispatch_tool_call(session_id, &call.id, &call.tool_name, call.arguments.clone(), &policy, cancel)
                    .await;
                tool_calls_executed += 1;
                messages.push(ChatMessage::tool_result(&call.id, &call.tool_name, outcome_to_content(&outcome)));
            }
        }

        warn!(session_id = %session_id, "turn hit max tool iteration cap without a final reply");
        Err(RuntimeError::ToolFailed {
            tool: "<turn>".to_string(),
            message: "exceeded max tool iterations".to_string(),
        })
    }

    async fn dispatch_tool_call(
        &self,
        session_id: &SessionId,
        tool_call_id: &str,
        tool_name: &str,
        args: serde_json::Value,
        policy: &ag3nt_policy::ToolPolicy,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        if !policy.is_tool_allowed(tool_name) {
            return ToolOutcome::failed(format!("tool '{tool_name}' is denied by the active policy"));
        }

        if tool_name == "apply_patch" {
            return self.dispatch_apply_patch(session_id, tool_call_id, args);
        }

        if SHELL_TOOLS.contains(&tool_name) {
            if let Some(command) = args.get("command").and_then(|v| v.as_str()) {
                let approval = self.shell_policy.evaluate(command);
                if approval.decision != ShellDecision::Allow {
                    return ToolOutcome::failed(format!(
                        "shell command not auto-approved ({:?}): {}",
                        approval.decision, approval.reason
                    ));
                }
            }
        }

        let path_arg = extract_path_arg(&args).map(PathBuf::from);
        if let Some(path) = &path_arg {
            if let Some(failure) = self.check_path_access(session_id, tool_name, path) {
                return failure;
            }
        }

        let is_write = is_write_operation(tool_name);
        let _write_lock = path_arg.as_ref().filter(|_| is_write).map(|p| self.freshness.acquire_write_lock(p));

        let pre_snapshot = if is_write {
            match self.snapshots.take_snapshot(&format!("before {tool_name}"), Vec::new()).await {
                Ok(hash) => Some(hash),
                Err(err) => return ToolOutcome::failed(format!("snapshot failed, tool call blocked: {err}")),
            }
        } else {
            None
        };

        if !is_write && ag3nt_cache::is_cacheable_tool(tool_name) {
            if let Some(cached) = self.cache.get(tool_name, &args) {
                return ToolOutcome::ok(cached);
            }
        }

        let Some(tool) = self.registry.get(tool_name) else {
            return ToolOutcome::failed(format!("tool '{tool_name}' is not registered"));
        };

        let invocation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ToolOutcome::failed("cancelled"),
            result = tokio::time::timeout(TOOL_TIMEOUT, tool.invoke(args.clone())) => result,
        };
        let outcome = match invocation {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::failed(format!("tool '{tool_name}' timed out after {TOOL_TIMEOUT:?}")),
        };

        if outcome.success {
            if let Some(path) = &path_arg {
                if is_write {
                    let _ = self.freshness.record_write(session_id, path);
                    self.cache.invalidate();
                } else {
                    let _ = self.freshness.record_read(session_id, path);
                }
            }
            if let (true, Some(snapshot_before)) = (is_write, pre_snapshot) {
                let files = path_arg.iter().map(|p| p.display().to_string()).collect();
                self.revert.record_action(session_id.as_str(), tool_call_id, files, snapshot_before, tool_name, tool_name);
            }
            if !is_write && ag3nt_cache::is_cacheable_tool(tool_name) {
                if let Some(content) = &outcome.content {
                    self.cache.set(tool_name, &args, content.clone());
                }
            }
        }

        outcome
    }

    fn check_path_access(&self, session_id: &SessionId, tool_name: &str, path: &std::path::Path) -> Option<ToolOutcome> {
        let operation = if is_write_operation(tool_name) { "write" } else { "read" };
        let (allowed, message) = self.path_protection.check_path(path, session_id, operation);
        if !allowed {
            return Some(ToolOutcome::failed(message));
        }

        let size = std::fs::metadata(path).ok().map(|m| m.len());
        let validation = if is_write_operation(tool_name) {
            self.file_security.validate_write(&path.to_string_lossy(), size)
        } else {
            self.file_security.validate_read(&path.to_string_lossy(), size)
        };
        if !validation.is_safe {
            return Some(ToolOutcome::failed(validation.reason));
        }

        // A write to a file that already exists must be built on a read this
        // session observed as current; writes that create a new file skip
        // this check, since there is nothing to have gone stale against.
        if operation == "write" && path.exists() {
            if let Err(err) = self.freshness.assert_fresh(session_id, path) {
                return Some(ToolOutcome::failed(err.to_string()));
            }
        }
        None
    }

    fn dispatch_apply_patch(&self, session_id: &SessionId, tool_call_id: &str, args: serde_json::Value) -> ToolOutcome {
        let Some(patch_text) = args.get("patch").and_then(|v| v.as_str()) else {
            return ToolOutcome::failed("apply_patch requires a 'patch' string argument");
        };
        let patches = match PatchParser::parse(patch_text) {
            Ok(patches) => patches,
            Err(err) => return ToolOutcome::failed(err.to_string()),
        };
        let dry_run = args.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false);
        let result = self.patch_applier.apply(&patches, dry_run);

        if result.success && !dry_run {
            for path in result.files_modified.iter().chain(result.files_added.iter()) {
                let _ = self.freshness.record_write(session_id, std::path::Path::new(path));
            }
            self.cache.invalidate();
        }

        ToolOutcome {
            success: result.success,
            content: Some(json!({
                "files_modified": result.files_modified,
                "files_added": result.files_added,
                "files_deleted": result.files_deleted,
                "warnings": result.warnings,
                "tool_call_id": tool_call_id,
            })),
            error: if result.errors.is_empty() { None } else { Some(result.errors.join("; ")) },
        }
    }
}

/// Rough token estimate used only to decide when compaction should run;
/// the model's own tokenizer is an external collaborator this crate
/// doesn't have access to.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

fn to_compaction_messages(messages: &[ChatMessage]) -> Vec<ag3nt_compaction::Message> {
    messages
        .iter()
        .map(|m| ag3nt_compaction::Message {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            tool_name: m.tool_name.clone(),
            token_count: estimate_tokens(&m.content),
        })
        .collect()
}

fn from_compaction_messages(messages: Vec<ag3nt_compaction::Message>) -> Vec<ChatMessage> {
    messages
        .into_iter()
        .map(|m| ChatMessage {
            role: match m.role.as_str() {
                "system" => Role::System,
                "assistant" => Role::Assistant,
                "tool" => Role::Tool,
                _ => Role::User,
            },
            content: m.content,
            tool_call_id: None,
            tool_calls: Vec::new(),
            tool_name: m.tool_name,
        })
        .collect()
}

fn outcome_to_content(outcome: &ToolOutcome) -> String {
    if outcome.success {
        outcome
            .content
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "ok".to_string())
    } else {
        format!("error: {}", outcome.error.as_deref().unwrap_or("unknown error"))
    }
}
