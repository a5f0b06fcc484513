// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ag3nt - ambient ops CLI for the AG3NT agent runtime.
//!
//! This binary is not the agent itself (that lives behind the turn
//! controller and the model/tool loop); it gives a human a way to poke at
//! the state the runtime leaves on disk between turns: undo/redo a
//! session's file-modifying actions, and inspect blueprints and artifacts.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{artifact, blueprint, revert};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "ag3nt", version, about = "AG3NT agent runtime — ops CLI")]
struct Cli {
    /// Override the data directory (defaults to ~/.ag3nt)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Undo the most recent file-modifying action in a session
    UndoLast(revert::RevertArgs),
    /// Revert a session back to the state before a specific tool call
    UndoTo {
        #[command(flatten)]
        args: revert::RevertArgs,
        /// The tool_call_id to revert to
        tool_call_id: String,
    },
    /// Re-apply the most recently undone/reverted change
    Unrevert(revert::RevertArgs),
    /// Show a session's revertible action history
    History {
        #[command(flatten)]
        args: revert::RevertArgs,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Inspect structured plans (blueprints)
    Blueprint(blueprint::BlueprintArgs),
    /// Inspect externalized tool output
    Artifact(artifact::ArtifactArgs),
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| ag3nt_core::Config::default().data_dir);

    match cli.command {
        Commands::UndoLast(args) => revert::undo_last(args, cli.output).await,
        Commands::UndoTo { args, tool_call_id } => revert::undo_to(args, tool_call_id, cli.output).await,
        Commands::Unrevert(args) => revert::unrevert(args, cli.output).await,
        Commands::History { args, limit } => revert::history(args, limit, cli.output),
        Commands::Blueprint(args) => blueprint::handle(args.command, data_dir, cli.output),
        Commands::Artifact(args) => artifact::handle(args.command, data_dir, cli.output),
    }
}
