// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ag3nt blueprint show` / `blueprint list` — read-only views over the
//! per-session structured plans the `write_blueprint` / `update_blueprint_task`
//! tools maintain on disk.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use ag3nt_blueprint::BlueprintManager;

use crate::output::{emit, OutputFormat};

#[derive(Args)]
pub struct BlueprintArgs {
    #[command(subcommand)]
    pub command: BlueprintCommand,
}

#[derive(Subcommand)]
pub enum BlueprintCommand {
    /// Show the active blueprint for a session (or a specific blueprint id)
    Show {
        /// Session id to resolve the active blueprint for
        #[arg(long, conflicts_with = "id")]
        session: Option<String>,
        /// Blueprint id to show directly
        id: Option<String>,
    },
    /// List recently updated blueprints
    List {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

fn storage_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("blueprints")
}

pub fn handle(command: BlueprintCommand, data_dir: PathBuf, format: OutputFormat) -> Result<()> {
    let manager = BlueprintManager::new(storage_dir(&data_dir));

    match command {
        BlueprintCommand::Show { session, id } => {
            let blueprint = match (session, id) {
                (Some(session), None) => manager.active_for_session(&session),
                (None, Some(id)) => manager.store().load(&id),
                _ => anyhow::bail!("pass either a blueprint id or --session, not both"),
            }
            .context("blueprint not found")?;

            emit(format, &blueprint, |bp| println!("{}", bp.to_markdown()));
        }
        BlueprintCommand::List { limit } => {
            let blueprints = manager.store().list_recent(limit);
            emit(format, &blueprints, |blueprints| {
                if blueprints.is_empty() {
                    println!("No blueprints found under {}.", storage_dir(&data_dir).display());
                    return;
                }
                for bp in blueprints {
                    println!(
                        "{:<16} {:<10} {:>3}/{:<3} tasks  {}",
                        bp.id.as_str(),
                        format!("{:?}", bp.status).to_lowercase(),
                        bp.current_task_index,
                        bp.tasks.len(),
                        bp.goal,
                    );
                }
            });
        }
    }
    Ok(())
}
