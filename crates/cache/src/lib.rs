// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-cache: an LRU+TTL memoization layer for read-only tool results.
//!
//! Only a fixed allowlist of tools is cacheable — tools whose result
//! depends solely on their arguments and the current state of the
//! filesystem/index, never on mutation or external side effects.
//!
//! Any invalidation, whether scoped to a single path or not, clears the
//! entire cache. This mirrors the system this crate is modeled on, which
//! cannot cheaply tell which cached entries a given path write might have
//! affected (a `grep` result touches paths that never appear as its own
//! cache key), so it invalidates everything rather than risk serving a
//! stale hit.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::debug;

/// Tools whose results this cache is permitted to memoize.
pub const CACHEABLE_TOOLS: &[&str] = &[
    "read_file",
    "glob_tool",
    "grep_tool",
    "codebase_search_tool",
    "list_directory",
];

pub fn is_cacheable_tool(tool_name: &str) -> bool {
    CACHEABLE_TOOLS.contains(&tool_name)
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    hits: u64,
    size_bytes: usize,
}

/// LRU ordered map with a wall-clock TTL check on read, keyed by a
/// `sha256(tool_name:canonical_json_args)[:24]` digest.
pub struct ToolResultCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
    max_size_bytes: usize,
}

struct Inner {
    entries: IndexMap<String, CacheEntry>,
    total_size_bytes: usize,
    stats: CacheStats,
}

impl ToolResultCache {
    pub fn new(ttl: Duration, max_entries: usize, max_size_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                total_size_bytes: 0,
                stats: CacheStats::default(),
            }),
            ttl,
            max_entries,
            max_size_bytes,
        }
    }

    pub fn make_key(tool_name: &str, args: &Value) -> String {
        let canonical = canonicalize(args);
        let digest = Sha256::digest(format!("{tool_name}:{canonical}").as_bytes());
        let hex = format!("{digest:x}");
        hex.chars().take(24).collect()
    }

    pub fn get(&self, tool_name: &str, args: &Value) -> Option<Value> {
        let key = Self::make_key(tool_name, args);
        let mut inner = self.inner.lock();

        let expired = inner
            .entries
            .get(&key)
            .map(|entry| entry.inserted_at.elapsed() > self.ttl)
            .unwrap_or(false);

        if expired {
            if let Some(entry) = inner.entries.shift_remove(&key) {
                inner.total_size_bytes -= entry.size_bytes;
            }
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.hits += 1;
            let value = entry.value.clone();
            inner.entries.move_index(
                inner.entries.get_index_of(&key).unwrap_or(0),
                inner.entries.len().saturating_sub(1),
            );
            inner.stats.hits += 1;
            Some(value)
        } else {
            inner.stats.misses += 1;
            None
        }
    }

    pub fn set(&self, tool_name: &str, args: &Value, value: Value) {
        let key = Self::make_key(tool_name, args);
        let size = estimate_size(&value);

        // Refuse to cache values that would dominate the whole budget.
        if size > self.max_size_bytes / 10 {
            debug!(tool_name, size, "value too large to cache, skipping");
            return;
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.entries.shift_remove(&key) {
            inner.total_size_bytes -= old.size_bytes;
        }

        self.evict_if_needed(&mut inner, size);

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                hits: 0,
                size_bytes: size,
            },
        );
        inner.total_size_bytes += size;
    }

    fn evict_if_needed(&self, inner: &mut Inner, incoming_size: usize) {
        while inner.entries.len() >= self.max_entries && !inner.entries.is_empty() {
            if let Some((_, entry)) = inner.entries.shift_remove_index(0) {
                inner.total_size_bytes -= entry.size_bytes;
                inner.stats.evictions += 1;
            }
        }
        while inner.total_size_bytes + incoming_size > self.max_size_bytes && !inner.entries.is_empty() {
            if let Some((_, entry)) = inner.entries.shift_remove_index(0) {
                inner.total_size_bytes -= entry.size_bytes;
                inner.stats.evictions += 1;
            }
        }
    }

    /// Clears the entire cache. Both whole-cache and path-scoped
    /// invalidation end up here: see the module docs for why.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_size_bytes = 0;
    }

    pub fn invalidate_path(&self, _path: &str) {
        self.invalidate();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn canonicalize(value: &Value) -> String {
    // serde_json's Map is a BTreeMap by default, so `to_string` already
    // produces sorted keys; this mirrors `json.dumps(..., sort_keys=True)`.
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

fn estimate_size(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(estimate_size).sum(),
        Value::Object(map) => map.values().map(estimate_size).sum(),
        Value::Null | Value::Bool(_) | Value::Number(_) => 8,
    }
    .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_is_a_hit() {
        let cache = ToolResultCache::new(Duration::from_secs(300), 10, 1_000_000);
        let args = json!({"path": "a.rs"});
        cache.set("read_file", &args, json!("contents"));
        assert_eq!(cache.get("read_file", &args), Some(json!("contents")));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn key_is_stable_regardless_of_object_key_order() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(
            ToolResultCache::make_key("grep_tool", &a),
            ToolResultCache::make_key("grep_tool", &b)
        );
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache = ToolResultCache::new(Duration::from_millis(1), 10, 1_000_000);
        let args = json!({"path": "a.rs"});
        cache.set("read_file", &args, json!("v"));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("read_file", &args), None);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn invalidate_path_clears_the_whole_cache() {
        let cache = ToolResultCache::new(Duration::from_secs(300), 10, 1_000_000);
        cache.set("read_file", &json!({"path": "a.rs"}), json!("1"));
        cache.set("read_file", &json!({"path": "b.rs"}), json!("2"));
        cache.invalidate_path("a.rs");
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_by_count_drops_oldest_entry() {
        let cache = ToolResultCache::new(Duration::from_secs(300), 2, 1_000_000);
        cache.set("read_file", &json!({"path": "a"}), json!("1"));
        cache.set("read_file", &json!({"path": "b"}), json!("2"));
        cache.set("read_file", &json!({"path": "c"}), json!("3"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("read_file", &json!({"path": "a"})), None);
    }

    #[test]
    fn oversized_value_is_not_cached() {
        let cache = ToolResultCache::new(Duration::from_secs(300), 10, 100);
        let huge = Value::String("x".repeat(1000));
        cache.set("read_file", &json!({"path": "a"}), huge);
        assert!(cache.is_empty());
    }

    #[test]
    fn is_cacheable_tool_rejects_mutating_tools() {
        assert!(is_cacheable_tool("read_file"));
        assert!(!is_cacheable_tool("write_file"));
    }
}
