// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase pipeline splitting: chain operators (`&&`, `||`, `;`) first,
//! then pipe operators (`|`) within each chain segment. Mirrors the
//! original's `ShellPipelineAnalyzer`.

use regex::Regex;
use std::sync::OnceLock;

fn chain_op() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*(?:&&|\|\||;)\s*").expect("valid regex"))
}

fn pipe_op() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\|\s*").expect("valid regex"))
}

/// Splits `command` into its pipeline/chain components, in order.
pub fn split_pipeline(command: &str) -> Vec<String> {
    let mut all = Vec::new();
    for chain_part in chain_op().split(command) {
        for pipe_part in pipe_op().split(chain_part.trim()) {
            let trimmed = pipe_part.trim();
            if !trimmed.is_empty() {
                all.push(trimmed.to_string());
            }
        }
    }
    all
}

/// True if `command` contains a chain operator (`&&`, `||`, `;`).
pub fn has_chains(command: &str) -> bool {
    chain_op().is_match(command)
}

/// Extracts the base binary name from a single command segment, unwrapping
/// an `env VAR=val cmd` prefix and stripping any path component.
pub fn extract_base_command(command: &str) -> String {
    let parts: Vec<&str> = command.trim().split_whitespace().collect();
    let Some(&first) = parts.first() else {
        return String::new();
    };

    let mut cmd = first;
    if cmd == "env" {
        for part in &parts[1..] {
            if !part.contains('=') {
                cmd = part;
                break;
            }
        }
    }

    let cmd = cmd.rsplit('/').next().unwrap_or(cmd);
    let cmd = cmd.rsplit('\\').next().unwrap_or(cmd);
    cmd.to_string()
}
