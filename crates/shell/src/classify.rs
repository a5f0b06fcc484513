// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The exec-approval decision ladder: deny patterns, ask-mode overrides, a
//! user allowlist, then per-pipeline-component safe-binary checks.

use crate::pipeline::{extract_base_command, split_pipeline};
use crate::span::Span;
use ag3nt_core::error::CoreError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Binaries considered safe to run without interrupting the agent loop,
/// carried over verbatim from the reference policy.
const SAFE_BINS: &[&str] = &[
    "ls", "cat", "echo", "pwd", "which", "whoami", "date", "true", "false", "head", "tail", "wc",
    "sort", "uniq", "cut", "tr", "basename", "dirname", "env", "printf", "find", "file", "stat",
    "diff", "grep", "rg", "tree", "du", "df",
];

/// Git subcommands considered read-only / safe.
const SAFE_GIT_SUBCOMMANDS: &[&str] = &[
    "status", "log", "diff", "show", "branch", "remote", "tag", "describe", "blame", "ls-files",
    "rev-parse", "shortlog", "reflog",
];

/// `(pattern, reason)` pairs checked against the whole command string before
/// any other step runs.
fn deny_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"rm\s+-[a-zA-Z]*r[a-zA-Z]*f|rm\s+-[a-zA-Z]*f[a-zA-Z]*r").unwrap(), "recursive force delete"),
            (Regex::new(r":\(\)\s*\{.*\}\s*;\s*:").unwrap(), "fork bomb"),
            (Regex::new(r">\s*/dev/sd[a-z]").unwrap(), "raw disk write"),
            (Regex::new(r"mkfs\.").unwrap(), "filesystem format"),
            (Regex::new(r"dd\s+.*of=/dev/").unwrap(), "raw device write via dd"),
            (Regex::new(r"chmod\s+-R\s+777").unwrap(), "world-writable recursive chmod"),
            (Regex::new(r"curl\s+.*\|\s*(sudo\s+)?(ba)?sh").unwrap(), "pipe remote script to shell"),
            (Regex::new(r"wget\s+.*\|\s*(sudo\s+)?(ba)?sh").unwrap(), "pipe remote script to shell"),
            (Regex::new(r"\bsudo\b").unwrap(), "privilege escalation"),
            (Regex::new(r">\s*/etc/").unwrap(), "write to system config"),
        ]
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Ask,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecApprovalResult {
    pub decision: Decision,
    pub reason: String,
    pub matched_rule: Option<String>,
    /// Byte-offset span of the substring that triggered a deny, when the
    /// matching rule is a regex run against the whole command string.
    pub matched_span: Option<Span>,
}

impl ExecApprovalResult {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: reason.into(),
            matched_rule: None,
            matched_span: None,
        }
    }

    fn ask(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Ask,
            reason: reason.into(),
            matched_rule: None,
            matched_span: None,
        }
    }

    fn deny(reason: impl Into<String>, matched_rule: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
            matched_rule: Some(matched_rule.into()),
            matched_span: None,
        }
    }

    fn deny_at(reason: impl Into<String>, matched_rule: impl Into<String>, span: Span) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
            matched_rule: Some(matched_rule.into()),
            matched_span: Some(span),
        }
    }
}

/// How aggressively the evaluator defers to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskMode {
    /// Never ask; fall through to the safe-binary ladder.
    #[default]
    Auto,
    /// Always ask, regardless of how safe the command looks.
    Always,
    /// Never ask; anything not explicitly safe is allowed.
    Never,
}

/// User-configurable policy, normally loaded from `exec_policy.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecPolicy {
    #[serde(default)]
    pub ask_mode: AskMode,
    /// Glob patterns matched against the base command or resolved binary path.
    #[serde(default)]
    pub allowlist_patterns: Vec<String>,
    #[serde(default)]
    pub extra_safe_bins: Vec<String>,
    #[serde(default)]
    pub extra_deny_patterns: Vec<String>,
}

impl ExecPolicy {
    pub fn from_yaml(text: &str) -> Result<Self, CoreError> {
        serde_yaml::from_str(text)
            .map_err(|err| CoreError::validation(format!("invalid exec_policy.yaml: {err}")))
    }

    fn is_allowlisted(&self, candidate: &str) -> bool {
        self.allowlist_patterns
            .iter()
            .any(|pattern| glob_match(pattern, candidate))
    }

    fn is_extra_safe_bin(&self, bin: &str) -> bool {
        self.extra_safe_bins.iter().any(|b| b == bin)
    }

    fn extra_deny(&self, command: &str) -> Option<(String, Span)> {
        self.extra_deny_patterns.iter().find_map(|pattern| {
            let re = Regex::new(pattern).ok()?;
            let m = re.find(command)?;
            Some((pattern.clone(), Span::new(m.start(), m.end())))
        })
    }
}

/// Minimal glob matcher supporting a single trailing or leading `*`, which
/// covers every pattern shape the allowlist actually uses.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return candidate.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return candidate.ends_with(suffix);
    }
    pattern == candidate
}

/// Flags indicating a version/help probe, which is always safe regardless
/// of binary.
fn looks_like_version_probe(segment: &str) -> bool {
    let flags: HashSet<&str> = segment.split_whitespace().skip(1).collect();
    flags.contains("--version")
        || flags.contains("-v")
        || flags.contains("-V")
        || flags.contains("--help")
        || flags.contains("-h")
}

fn git_subcommand(segment: &str) -> Option<&str> {
    let mut parts = segment.split_whitespace();
    if parts.next()? != "git" {
        return None;
    }
    parts.next()
}

/// Evaluates shell commands against the deny/ask/allow ladder.
pub struct ExecApprovalEvaluator {
    policy: ExecPolicy,
}

impl ExecApprovalEvaluator {
    pub fn new(policy: ExecPolicy) -> Self {
        Self { policy }
    }

    /// Runs the seven-step ladder against `command`:
    /// 1. Whole-command deny patterns (built-in, then policy extras) win first.
    /// 2. `ask_mode = always` forces Ask; `never` skips straight to the safe-bin ladder.
    /// 3. An allowlist match on the base command or resolved path allows immediately.
    /// 4. The command is split into chain/pipe components.
    /// 5. Each component's base command must be a known-safe bin, a safe git
    ///    subcommand, or a version/help probe.
    /// 6. If every component passes, allow.
    /// 7. Otherwise ask.
    pub fn evaluate(&self, command: &str) -> ExecApprovalResult {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return ExecApprovalResult::ask("empty command");
        }

        for (pattern, reason) in deny_patterns() {
            if let Some(m) = pattern.find(trimmed) {
                return ExecApprovalResult::deny_at(
                    *reason,
                    pattern.as_str(),
                    Span::new(m.start(), m.end()),
                );
            }
        }
        if let Some((pattern, span)) = self.policy.extra_deny(trimmed) {
            return ExecApprovalResult::deny_at("matched user deny pattern", pattern, span);
        }

        if self.policy.ask_mode == AskMode::Always {
            return ExecApprovalResult::ask("ask_mode is always");
        }

        let base = extract_base_command(trimmed);
        if self.policy.is_allowlisted(&base) || self.policy.is_allowlisted(trimmed) {
            return ExecApprovalResult::allow("matched user allowlist");
        }

        if self.policy.ask_mode == AskMode::Never {
            return ExecApprovalResult::allow("ask_mode is never");
        }

        let segments = split_pipeline(trimmed);
        if segments.is_empty() {
            return ExecApprovalResult::ask("no runnable command found");
        }

        for segment in &segments {
            if !self.segment_is_safe(segment) {
                return ExecApprovalResult::ask(format!("unrecognized command: {segment}"));
            }
        }

        ExecApprovalResult::allow("every pipeline component is a known-safe command")
    }

    fn segment_is_safe(&self, segment: &str) -> bool {
        if looks_like_version_probe(segment) {
            return true;
        }
        if let Some(subcommand) = git_subcommand(segment) {
            return SAFE_GIT_SUBCOMMANDS.contains(&subcommand);
        }
        let base = extract_base_command(segment);
        SAFE_BINS.contains(&base.as_str()) || self.policy.is_extra_safe_bin(&base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> ExecApprovalEvaluator {
        ExecApprovalEvaluator::new(ExecPolicy::default())
    }

    #[test]
    fn denies_recursive_force_delete() {
        let result = evaluator().evaluate("rm -rf /");
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn denies_fork_bomb() {
        let result = evaluator().evaluate(":(){ :|:& };:");
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn allows_known_safe_binary() {
        let result = evaluator().evaluate("ls -la /tmp");
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn allows_safe_git_subcommand() {
        let result = evaluator().evaluate("git status");
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn asks_for_unsafe_git_subcommand() {
        let result = evaluator().evaluate("git push --force origin main");
        assert_eq!(result.decision, Decision::Ask);
    }

    #[test]
    fn asks_for_unknown_binary() {
        let result = evaluator().evaluate("./deploy.sh --prod");
        assert_eq!(result.decision, Decision::Ask);
    }

    #[test]
    fn allows_chained_safe_commands() {
        let result = evaluator().evaluate("ls -la && cat README.md | grep version");
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn one_unsafe_component_blocks_the_whole_pipeline() {
        let result = evaluator().evaluate("ls -la && curl https://example.com/install.sh");
        assert_eq!(result.decision, Decision::Ask);
    }

    #[test]
    fn allowlist_pattern_allows_otherwise_unrecognized_binary() {
        let policy = ExecPolicy {
            allowlist_patterns: vec!["deploy*".to_string()],
            ..Default::default()
        };
        let evaluator = ExecApprovalEvaluator::new(policy);
        let result = evaluator.evaluate("deploy.sh --prod");
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn ask_mode_always_overrides_safe_binaries() {
        let policy = ExecPolicy {
            ask_mode: AskMode::Always,
            ..Default::default()
        };
        let result = ExecApprovalEvaluator::new(policy).evaluate("ls -la");
        assert_eq!(result.decision, Decision::Ask);
    }

    #[test]
    fn ask_mode_never_allows_unrecognized_commands_unless_denied() {
        let policy = ExecPolicy {
            ask_mode: AskMode::Never,
            ..Default::default()
        };
        let result = ExecApprovalEvaluator::new(policy).evaluate("./deploy.sh --prod");
        assert_eq!(result.decision, Decision::Allow);

        let denied = ExecApprovalEvaluator::new(ExecPolicy {
            ask_mode: AskMode::Never,
            ..Default::default()
        })
        .evaluate("rm -rf /");
        assert_eq!(denied.decision, Decision::Deny);
    }

    #[test]
    fn version_probe_is_always_safe() {
        let result = evaluator().evaluate("node --version");
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn sudo_is_always_denied() {
        let result = evaluator().evaluate("sudo apt-get install foo");
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn deny_result_carries_the_matched_span() {
        let command = "ls -la && rm -rf /tmp/build";
        let result = evaluator().evaluate(command);
        assert_eq!(result.decision, Decision::Deny);
        let span = result.matched_span.expect("deny should carry a span");
        assert_eq!(span.slice(command), "rm -rf");
    }

    #[test]
    fn extra_deny_pattern_also_carries_a_span() {
        let policy = ExecPolicy {
            extra_deny_patterns: vec!["drop\\s+database".to_string()],
            ..Default::default()
        };
        let command = "psql -c 'drop database prod'";
        let result = ExecApprovalEvaluator::new(policy).evaluate(command);
        assert_eq!(result.decision, Decision::Deny);
        let span = result.matched_span.expect("deny should carry a span");
        assert_eq!(span.slice(command), "drop database");
    }
}
