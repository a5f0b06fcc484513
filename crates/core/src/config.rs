// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered configuration resolution: built-in defaults, overridden by
//! `~/.ag3nt/config.toml`, overridden by `AG3NT_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level AG3NT configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub pool_size: usize,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub compaction_token_threshold: usize,
    pub compaction_message_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pool_size: 2,
            cache_ttl_secs: 300,
            cache_max_entries: 500,
            compaction_token_threshold: 80_000,
            compaction_message_threshold: 100,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs_data_dir().unwrap_or_else(|| PathBuf::from(".ag3nt"))
}

// `dirs` is not a dependency of this crate (it's an ambient CLI-only
// concern); resolve $HOME directly to avoid pulling it in here.
fn dirs_data_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ag3nt"))
}

impl Config {
    /// Load the layered configuration: defaults, then `path` (if it
    /// exists), then `AG3NT_*` environment variable overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let from_file: Config = toml::from_str(&text)?;
            config = from_file;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AG3NT_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AG3NT_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.pool_size = n;
            }
        }
        if let Ok(v) = std::env::var("AG3NT_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache_ttl_secs = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let config = Config::load(Path::new("/nonexistent/ag3nt/config.toml")).unwrap();
        assert_eq!(config.pool_size, 2);
    }

    #[test]
    fn env_override_wins_over_file_default() {
        std::env::set_var("AG3NT_POOL_SIZE", "7");
        let config = Config::load(Path::new("/nonexistent/ag3nt/config.toml")).unwrap();
        assert_eq!(config.pool_size, 7);
        std::env::remove_var("AG3NT_POOL_SIZE");
    }
}
