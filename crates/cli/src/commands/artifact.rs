// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ag3nt artifact list` / `artifact show` — inspect tool output the
//! compaction pipeline's observation-masking stage externalized.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use ag3nt_compaction::artifact::ArtifactStore;

use crate::output::{emit, OutputFormat};

#[derive(Args)]
pub struct ArtifactArgs {
    #[command(subcommand)]
    pub command: ArtifactCommand,
}

#[derive(Subcommand)]
pub enum ArtifactCommand {
    /// List stored artifacts, newest first
    List {
        #[arg(long)]
        tool: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a single artifact's content
    Show { id: String },
}

fn artifacts_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("artifacts")
}

pub fn handle(command: ArtifactCommand, data_dir: PathBuf, format: OutputFormat) -> Result<()> {
    let store = ArtifactStore::open(artifacts_dir(&data_dir)).context("opening artifact store")?;

    match command {
        ArtifactCommand::List { tool, session, limit } => {
            let artifacts = store.list_artifacts(tool.as_deref(), session.as_deref(), limit);
            emit(format, &artifacts, |artifacts| {
                if artifacts.is_empty() {
                    println!("No artifacts found under {}.", artifacts_dir(&data_dir).display());
                    return;
                }
                for meta in artifacts {
                    println!(
                        "{:<24} {:<16} {:>8} bytes  {}",
                        meta.artifact_id,
                        meta.tool_name,
                        meta.size_bytes,
                        meta.created_at.to_rfc3339(),
                    );
                }
            });
        }
        ArtifactCommand::Show { id } => {
            let content = store
                .read_artifact(&id)
                .with_context(|| format!("artifact '{id}' not found"))?;
            print!("{content}");
            if !content.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
