// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ag3nt undo-last` / `undo-to` / `unrevert` / `history` — the CLI-side
//! mirror of the revert tools the agent sees through the tool registry
//! (`undo_last`, `undo_to`, `unrevert`, `show_undo_history`).

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use ag3nt_snapshot::revert::{RevertResult, SessionRevert};
use ag3nt_snapshot::SnapshotManager;

use crate::output::{emit, format_time_ago, OutputFormat};

#[derive(Args)]
pub struct RevertArgs {
    /// Workspace directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Session id whose history to operate on
    #[arg(long, default_value = "default")]
    pub session: String,
}

fn open(workspace: Option<PathBuf>) -> Result<(Arc<SnapshotManager>, SessionRevert)> {
    let workspace = workspace
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .context("resolving workspace directory")?;
    let snapshots = Arc::new(
        SnapshotManager::new(&workspace, None)
            .with_context(|| format!("opening snapshot store for {}", workspace.display()))?,
    );
    let revert = SessionRevert::new(snapshots.clone());
    Ok((snapshots, revert))
}

#[derive(Serialize)]
struct RevertOutcome {
    success: bool,
    message: String,
    files_changed: Vec<String>,
    snapshot_hash: String,
}

impl From<RevertResult> for RevertOutcome {
    fn from(r: RevertResult) -> Self {
        Self {
            success: r.success,
            message: r.message,
            files_changed: r.files_changed,
            snapshot_hash: r.snapshot_hash,
        }
    }
}

fn print_result(result: &RevertResult) {
    if result.success {
        println!("{}", result.message);
        for file in &result.files_changed {
            println!("  {file}");
        }
    } else {
        eprintln!("{}", result.message);
    }
}

pub async fn undo_last(args: RevertArgs, format: OutputFormat) -> Result<()> {
    let (_snapshots, revert) = open(args.workspace)?;
    let result = revert.undo_last(&args.session).await;
    let ok = result.success;
    emit(format, &RevertOutcome::from(result.clone()), |_| print_result(&result));
    if !ok {
        anyhow::bail!("undo-last failed");
    }
    Ok(())
}

pub async fn undo_to(args: RevertArgs, tool_call_id: String, format: OutputFormat) -> Result<()> {
    let (_snapshots, revert) = open(args.workspace)?;
    let result = revert.revert_to(&args.session, &tool_call_id).await;
    let ok = result.success;
    emit(format, &RevertOutcome::from(result.clone()), |_| print_result(&result));
    if !ok {
        anyhow::bail!("undo-to failed");
    }
    Ok(())
}

pub async fn unrevert(args: RevertArgs, format: OutputFormat) -> Result<()> {
    let (_snapshots, revert) = open(args.workspace)?;
    let result = revert.unrevert(&args.session).await;
    let ok = result.success;
    emit(format, &RevertOutcome::from(result.clone()), |_| print_result(&result));
    if !ok {
        anyhow::bail!("unrevert failed");
    }
    Ok(())
}

#[derive(Serialize)]
struct HistoryEntry {
    tool_call_id: String,
    tool_name: String,
    label: String,
    files: Vec<String>,
    snapshot_prefix: String,
    recorded_at: chrono::DateTime<chrono::Utc>,
}

pub fn history(args: RevertArgs, limit: usize, format: OutputFormat) -> Result<()> {
    let (_snapshots, revert) = open(args.workspace)?;
    let entries: Vec<HistoryEntry> = revert
        .list_actions(&args.session, limit)
        .into_iter()
        .map(|a| HistoryEntry {
            tool_call_id: a.tool_call_id,
            tool_name: a.tool_name,
            label: a.label,
            files: a.files,
            snapshot_prefix: a.snapshot_prefix,
            recorded_at: a.recorded_at,
        })
        .collect();

    emit(format, &entries, |entries| {
        if entries.is_empty() {
            println!("No actions recorded for session '{}'.", args.session);
            return;
        }
        for e in entries {
            println!(
                "{:<12} {:<18} {:>4} file(s)  {:<8}  {}",
                e.tool_call_id,
                e.tool_name,
                e.files.len(),
                format_time_ago(e.recorded_at),
                e.label,
            );
        }
    });
    Ok(())
}
