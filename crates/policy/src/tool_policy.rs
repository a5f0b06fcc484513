// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool access control via allow/deny lists, resolved from a built-in
//! profile (`minimal`, `coding`, `messaging`, `full`) plus an optional
//! YAML override file.

use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const TOOL_GROUPS: &[(&str, &[&str])] = &[
    (
        "group:fs",
        &[
            "read_file", "write_file", "edit_file", "delete_file",
            "read", "write", "edit",
            "glob_tool", "grep_tool", "notebook_tool",
            "read_directory", "list_directory",
        ],
    ),
    (
        "group:runtime",
        &["exec_command", "process_tool", "shell", "execute", "bash", "sandbox_run_command"],
    ),
    (
        "group:web",
        &["internet_search", "fetch_url", "web_search", "web_fetch", "http_request"],
    ),
    (
        "group:memory",
        &["memory_search", "codebase_search_tool", "memory_summarize"],
    ),
    ("group:patch", &["apply_patch"]),
    ("group:lsp", &["lsp_tool"]),
    ("group:lint", &["lint_tool"]),
    ("group:revert", &["undo_last", "undo_to", "unrevert", "show_undo_history"]),
];

fn expand_group(name: &str) -> Option<&'static [&'static str]> {
    TOOL_GROUPS.iter().find(|(group, _)| *group == name).map(|(_, tools)| *tools)
}

struct Profile {
    name: &'static str,
    allow: &'static [&'static str],
    deny: &'static [&'static str],
}

const PROFILES: &[Profile] = &[
    Profile {
        name: "minimal",
        allow: &["group:fs", "group:memory", "internet_search", "fetch_url", "ask_user"],
        deny: &["group:runtime", "group:patch", "write_file", "edit_file", "delete_file"],
    },
    Profile {
        name: "coding",
        allow: &[
            "group:fs", "group:runtime", "group:web", "group:memory", "group:patch",
            "ask_user", "task", "run_skill", "schedule_reminder", "deep_reasoning",
        ],
        deny: &[],
    },
    Profile {
        name: "messaging",
        allow: &[
            "group:fs", "group:runtime", "group:web", "group:memory", "group:patch",
            "ask_user", "task", "run_skill", "schedule_reminder", "deep_reasoning",
        ],
        deny: &[],
    },
    Profile {
        name: "full",
        allow: &["*"],
        deny: &[],
    },
];

fn profile_defaults(name: &str) -> Option<(Vec<String>, Vec<String>)> {
    PROFILES.iter().find(|p| p.name == name).map(|p| {
        (
            p.allow.iter().map(|s| s.to_string()).collect(),
            p.deny.iter().map(|s| s.to_string()).collect(),
        )
    })
}

/// A resolved allow/deny policy. Deny always wins over allow; an empty
/// allow list (after expansion) means "allow everything not denied".
#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub profile: String,
}

impl ToolPolicy {
    pub fn new(allow: Vec<String>, deny: Vec<String>, profile: impl Into<String>) -> Self {
        Self {
            allow,
            deny,
            profile: profile.into(),
        }
    }

    fn expand(items: &[String]) -> HashSet<String> {
        let mut expanded = HashSet::new();
        for item in items {
            if let Some(tools) = expand_group(item) {
                expanded.extend(tools.iter().map(|t| t.to_string()));
            } else {
                expanded.insert(item.clone());
            }
        }
        expanded
    }

    pub fn is_tool_allowed(&self, name: &str) -> bool {
        let denied = Self::expand(&self.deny);
        if denied.contains(name) {
            return false;
        }

        let allowed = Self::expand(&self.allow);
        if allowed.contains("*") || allowed.contains(name) {
            return true;
        }
        if !allowed.is_empty() {
            return false;
        }
        true
    }
}

#[derive(Debug, Deserialize)]
struct ToolPolicyConfigFile {
    profile: Option<String>,
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    deny: Vec<String>,
}

/// Loads and caches the active [`ToolPolicy`], honoring an
/// `AG3NT_TOOL_PROFILE` environment override and an optional YAML config
/// file at `config_path` (default `~/.ag3nt/tool_policy.yaml`).
pub struct ToolPolicyManager {
    config_path: PathBuf,
    policy: Mutex<Option<ToolPolicy>>,
}

impl ToolPolicyManager {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| {
            dirs_home().join(".ag3nt").join("tool_policy.yaml")
        });
        Self {
            config_path,
            policy: Mutex::new(None),
        }
    }

    fn load_config(&self) -> Option<ToolPolicyConfigFile> {
        if !self.config_path.exists() {
            return None;
        }
        match std::fs::read_to_string(&self.config_path) {
            Ok(text) => match serde_yaml::from_str(&text) {
                Ok(config) => Some(config),
                Err(err) => {
                    tracing::warn!(path = %self.config_path.display(), %err, "failed to parse tool policy config");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(path = %self.config_path.display(), %err, "failed to read tool policy config");
                None
            }
        }
    }

    pub fn load_policy(&self) -> ToolPolicy {
        if let Some(policy) = self.policy.lock().clone() {
            return policy;
        }

        let profile_override = std::env::var("AG3NT_TOOL_PROFILE").ok();
        let config = self.load_config();

        let policy = match config {
            Some(cfg) => {
                let profile = profile_override.unwrap_or_else(|| cfg.profile.unwrap_or_else(|| "coding".to_string()));
                let mut allow = cfg.allow;
                let mut deny = cfg.deny;
                if allow.is_empty() && deny.is_empty() {
                    if let Some((p_allow, p_deny)) = profile_defaults(&profile) {
                        allow = p_allow;
                        deny = p_deny;
                    }
                }
                ToolPolicy::new(allow, deny, profile)
            }
            None => {
                let profile = profile_override
                    .filter(|p| profile_defaults(p).is_some())
                    .unwrap_or_else(|| "coding".to_string());
                let (allow, deny) = profile_defaults(&profile).unwrap_or_else(|| profile_defaults("coding").unwrap());
                ToolPolicy::new(allow, deny, profile)
            }
        };

        tracing::info!(profile = %policy.profile, "tool policy loaded");
        *self.policy.lock() = Some(policy.clone());
        policy
    }

    /// Splits `tool_names` into those the active policy allows and those
    /// it removes, logging the removed set at info level.
    pub fn filter_tools(&self, tool_names: &[String]) -> (Vec<String>, Vec<String>) {
        let policy = self.load_policy();
        let mut allowed = Vec::new();
        let mut removed = Vec::new();
        for name in tool_names {
            if policy.is_tool_allowed(name) {
                allowed.push(name.clone());
            } else {
                removed.push(name.clone());
            }
        }
        if !removed.is_empty() {
            tracing::info!(profile = %policy.profile, removed = ?removed, "tool policy removed tools");
        }
        (allowed, removed)
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// Tools recognized as performing filesystem or shell writes.
pub const WRITE_TOOLS: &[&str] = &[
    "write_file", "edit_file", "delete_file",
    "multi_edit", "apply_patch",
    "exec_command", "shell", "bash",
    "notebook_tool",
];

pub fn is_write_operation(tool_name: &str) -> bool {
    WRITE_TOOLS.contains(&tool_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_expands_to_member_tools() {
        let policy = ToolPolicy::new(vec!["group:fs".to_string()], vec![], "custom");
        assert!(policy.is_tool_allowed("read_file"));
        assert!(!policy.is_tool_allowed("shell"));
    }

    #[test]
    fn deny_wins_over_allow() {
        let policy = ToolPolicy::new(
            vec!["group:fs".to_string()],
            vec!["write_file".to_string()],
            "custom",
        );
        assert!(policy.is_tool_allowed("read_file"));
        assert!(!policy.is_tool_allowed("write_file"));
    }

    #[test]
    fn wildcard_allow_permits_everything_not_denied() {
        let policy = ToolPolicy::new(vec!["*".to_string()], vec!["shell".to_string()], "full");
        assert!(policy.is_tool_allowed("anything"));
        assert!(!policy.is_tool_allowed("shell"));
    }

    #[test]
    fn empty_allow_list_permits_everything_not_denied() {
        let policy = ToolPolicy::new(vec![], vec!["shell".to_string()], "coding");
        assert!(policy.is_tool_allowed("read_file"));
        assert!(!policy.is_tool_allowed("shell"));
    }

    #[test]
    fn nonempty_allow_without_wildcard_denies_unlisted_tools() {
        let policy = ToolPolicy::new(vec!["read_file".to_string()], vec![], "custom");
        assert!(policy.is_tool_allowed("read_file"));
        assert!(!policy.is_tool_allowed("write_file"));
    }

    #[test]
    #[serial_test::serial]
    fn minimal_profile_denies_runtime_and_writes() {
        let manager = ToolPolicyManager::new(Some(PathBuf::from("/nonexistent/tool_policy.yaml")));
        std::env::set_var("AG3NT_TOOL_PROFILE", "minimal");
        let policy = manager.load_policy();
        std::env::remove_var("AG3NT_TOOL_PROFILE");
        assert_eq!(policy.profile, "minimal");
        assert!(policy.is_tool_allowed("read_file"));
        assert!(!policy.is_tool_allowed("shell"));
        assert!(!policy.is_tool_allowed("write_file"));
    }

    #[test]
    #[serial_test::serial]
    fn defaults_to_coding_profile_with_no_config_or_override() {
        let manager = ToolPolicyManager::new(Some(PathBuf::from("/nonexistent/tool_policy.yaml")));
        let policy = manager.load_policy();
        assert_eq!(policy.profile, "coding");
        assert!(policy.is_tool_allowed("shell"));
    }

    #[test]
    fn is_write_operation_recognizes_mutating_tools() {
        assert!(is_write_operation("write_file"));
        assert!(is_write_operation("apply_patch"));
        assert!(!is_write_operation("read_file"));
    }
}
