// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-compaction: reduces an over-long conversation back under budget
//! through four sequential, independently-toggleable stages (masking,
//! memory flush, pruning, progressive summarization), plus the artifact
//! store that the masking stage offloads large tool output into.

pub mod artifact;
pub mod memory_flush;

use artifact::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// A single turn's message, reduced to what compaction needs to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub tool_name: Option<String>,
    pub token_count: usize,
}

/// Condenses a chunk of messages into prose. The runtime normally injects
/// an LLM-backed implementation; [`HeuristicSummarizer`] is the fallback
/// used when none is supplied, matching spec.md's "if not provided, a
/// default heuristic summarizer is used".
pub trait Summarizer: Send + Sync {
    fn summarize(&self, chunk: &[Message]) -> String;
}

/// Default summarizer: one bullet per message, role-prefixed, truncated to
/// a short snippet. No LLM call.
#[derive(Debug, Clone, Default)]
pub struct HeuristicSummarizer;

impl Summarizer for HeuristicSummarizer {
    fn summarize(&self, chunk: &[Message]) -> String {
        chunk
            .iter()
            .map(|m| {
                let snippet: String = m.content.chars().take(80).collect();
                format!("- {}: {}", m.role, snippet.trim())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct CompactionConfig {
    pub enabled: bool,
    pub token_threshold: usize,
    pub message_threshold: usize,
    pub enable_masking: bool,
    pub enable_flush: bool,
    pub enable_pruning: bool,
    pub enable_progressive: bool,
    pub preserve_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl CompactionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            token_threshold: 80_000,
            message_threshold: 100,
            enable_masking: false,
            enable_flush: false,
            enable_pruning: false,
            enable_progressive: false,
            preserve_recent: 20,
        }
    }

    pub fn conservative() -> Self {
        Self {
            enabled: true,
            token_threshold: 120_000,
            message_threshold: 150,
            enable_masking: true,
            enable_flush: true,
            enable_pruning: false,
            enable_progressive: false,
            preserve_recent: 40,
        }
    }

    pub fn balanced() -> Self {
        Self {
            enabled: true,
            token_threshold: 80_000,
            message_threshold: 100,
            enable_masking: true,
            enable_flush: true,
            enable_pruning: true,
            enable_progressive: true,
            preserve_recent: 20,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            enabled: true,
            token_threshold: 50_000,
            message_threshold: 60,
            enable_masking: true,
            enable_flush: true,
            enable_pruning: true,
            enable_progressive: true,
            preserve_recent: 10,
        }
    }

    pub fn should_compact(&self, token_count: usize, message_count: usize) -> bool {
        self.enabled
            && (token_count >= self.token_threshold || message_count >= self.message_threshold)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompactionMetrics {
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub messages_before: usize,
    pub messages_after: usize,
    pub artifacts_created: usize,
    pub insights_flushed: usize,
    pub chunks_summarized: usize,
    pub duration_ms: u64,
}

impl CompactionMetrics {
    pub fn compression_ratio(&self) -> f64 {
        if self.tokens_before == 0 {
            1.0
        } else {
            self.tokens_after as f64 / self.tokens_before as f64
        }
    }
}

/// Runs the four compaction stages in strict order, each gated by its own
/// `enable_*` flag, all evaluated once against the trigger rather than
/// re-checked stage to stage. A no-op (metrics with `tokens_after ==
/// tokens_before`) is returned when `should_compact` is false.
pub struct CompactionMiddleware {
    config: CompactionConfig,
    flusher: memory_flush::MemoryFlusher,
    artifacts: Arc<ArtifactStore>,
    summarizer: Arc<dyn Summarizer>,
}

impl CompactionMiddleware {
    pub fn new(config: CompactionConfig, artifacts: Arc<ArtifactStore>) -> Self {
        let flush_config = memory_flush::FlushConfig {
            enabled: config.enable_flush,
            ..memory_flush::FlushConfig::default()
        };
        Self {
            config,
            flusher: memory_flush::MemoryFlusher::new(flush_config),
            artifacts,
            summarizer: Arc::new(HeuristicSummarizer),
        }
    }

    /// Injects a non-default summarizer (normally an LLM-backed one owned
    /// by the runtime) for the progressive-summarization stage.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn compact(&self, messages: &mut Vec<Message>) -> CompactionMetrics {
        self.compact_for_session(messages, None)
    }

    pub fn compact_for_session(
        &self,
        messages: &mut Vec<Message>,
        session_id: Option<&str>,
    ) -> CompactionMetrics {
        let tokens_before: usize = messages.iter().map(|m| m.token_count).sum();
        let messages_before = messages.len();

        if !self.config.should_compact(tokens_before, messages_before) {
            return CompactionMetrics {
                tokens_before,
                tokens_after: tokens_before,
                messages_before,
                messages_after: messages_before,
                ..Default::default()
            };
        }

        let start = Instant::now();
        let mut artifacts_created = 0;
        let mut insights_flushed = 0;
        let mut chunks_summarized = 0;

        if self.config.enable_masking {
            artifacts_created = self.mask_large_tool_results(messages, session_id);
        }
        if self.config.enable_flush {
            if let Some(result) = self.flusher.flush(messages) {
                insights_flushed = result.total_insights;
            }
        }
        if self.config.enable_pruning {
            self.prune_low_value_messages(messages);
        }
        if self.config.enable_progressive {
            chunks_summarized = self.progressive_summarize(messages);
        }

        let tokens_after: usize = messages.iter().map(|m| m.token_count).sum();
        let messages_after = messages.len();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            tokens_before,
            tokens_after,
            ratio = tokens_after as f64 / tokens_before.max(1) as f64,
            duration_ms,
            "compaction complete"
        );

        CompactionMetrics {
            tokens_before,
            tokens_after,
            messages_before,
            messages_after,
            artifacts_created,
            insights_flushed,
            chunks_summarized,
            duration_ms,
        }
    }

    /// Stage 1: replace large tool-result bodies with a short pointer,
    /// offloading the original content into the artifact store so it can
    /// be fetched back on demand. At most one artifact per message.
    /// Returns the number of messages masked.
    fn mask_large_tool_results(
        &self,
        messages: &mut [Message],
        session_id: Option<&str>,
    ) -> usize {
        const MASK_THRESHOLD_CHARS: usize = 4_000;
        let recent_cutoff = messages.len().saturating_sub(self.config.preserve_recent);
        let mut masked = 0;

        for (i, message) in messages.iter_mut().enumerate() {
            if i >= recent_cutoff {
                continue;
            }
            let Some(tool_name) = message.tool_name.clone() else {
                continue;
            };
            if message.content.len() <= MASK_THRESHOLD_CHARS {
                continue;
            }

            match self.artifacts.write_artifact(
                &tool_name,
                &message.content,
                session_id.map(str::to_string),
                vec!["compaction-mask".to_string()],
            ) {
                Ok(meta) => {
                    message.content = format!(
                        "[artifact:{} — {} bytes masked, fetch with read_artifact]",
                        meta.artifact_id, meta.size_bytes
                    );
                    message.token_count = message.token_count.min(20);
                    masked += 1;
                }
                Err(err) => {
                    tracing::warn!(%err, tool_name, "failed to mask tool result into an artifact");
                }
            }
        }
        masked
    }

    /// Stage 3: drops old, low-value messages (already-masked artifact
    /// pointers, empty or trivially short tool chatter) outside the
    /// preserved window. Unlike stage 4, this never touches messages that
    /// still carry real content — those are left for progressive
    /// summarization to condense.
    fn prune_low_value_messages(&self, messages: &mut Vec<Message>) {
        let keep_from = messages.len().saturating_sub(self.config.preserve_recent);
        if keep_from == 0 {
            return;
        }
        let mut index = 0usize;
        messages.retain(|message| {
            let is_old = index < keep_from;
            index += 1;
            if !is_old {
                return true;
            }
            !is_low_value(message)
        });
    }

    /// Stage 4: partitions the non-preserved portion into fixed-size
    /// chunks, asks the injected summarizer to condense each one, merges
    /// the results into a single synthetic message labeled
    /// `[Previous conversation summary]`, and prepends it to what's left.
    /// Returns the number of chunks summarized.
    fn progressive_summarize(&self, messages: &mut Vec<Message>) -> usize {
        const CHUNK_SIZE: usize = 8;

        let preserve_from = messages.len().saturating_sub(self.config.preserve_recent);
        if preserve_from == 0 {
            return 0;
        }

        let to_summarize: Vec<Message> = messages.drain(0..preserve_from).collect();
        if to_summarize.is_empty() {
            return 0;
        }

        let chunk_summaries: Vec<String> = to_summarize
            .chunks(CHUNK_SIZE)
            .map(|chunk| self.summarizer.summarize(chunk))
            .collect();
        let chunks_summarized = chunk_summaries.len();

        let merged = chunk_summaries.join("\n");
        let summary_message = Message {
            role: "user".to_string(),
            content: format!("[Previous conversation summary]\n{merged}"),
            tool_name: None,
            token_count: (merged.len() / 4).max(1),
        };
        messages.insert(0, summary_message);
        chunks_summarized
    }
}

fn is_low_value(message: &Message) -> bool {
    message.tool_name.is_some()
        && (message.content.starts_with("[artifact:")
            || message.content.trim().is_empty()
            || message.content.len() < 40)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    pub runs: usize,
    pub avg_compression_ratio: f64,
    pub total_artifacts: usize,
    pub total_insights: usize,
    pub avg_duration_ms: f64,
}

pub fn aggregate_stats(history: &[CompactionMetrics]) -> AggregateStats {
    if history.is_empty() {
        return AggregateStats::default();
    }
    let runs = history.len();
    let avg_compression_ratio =
        history.iter().map(CompactionMetrics::compression_ratio).sum::<f64>() / runs as f64;
    let total_artifacts = history.iter().map(|m| m.artifacts_created).sum();
    let total_insights = history.iter().map(|m| m.insights_flushed).sum();
    let avg_duration_ms =
        history.iter().map(|m| m.duration_ms as f64).sum::<f64>() / runs as f64;

    AggregateStats {
        runs,
        avg_compression_ratio,
        total_artifacts,
        total_insights,
        avg_duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str, tokens: usize) -> Message {
        Message {
            role: role.into(),
            content: content.into(),
            tool_name: None,
            token_count: tokens,
        }
    }

    fn middleware(config: CompactionConfig) -> (tempfile::TempDir, CompactionMiddleware) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::open(dir.path().join("artifacts")).unwrap());
        (dir, CompactionMiddleware::new(config, artifacts))
    }

    #[test]
    fn below_threshold_is_a_no_op() {
        let (_dir, middleware) = middleware(CompactionConfig::balanced());
        let mut messages = vec![msg("user", "hi", 5)];
        let metrics = middleware.compact(&mut messages);
        assert_eq!(metrics.tokens_before, metrics.tokens_after);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn over_message_threshold_triggers_pruning() {
        let config = CompactionConfig {
            message_threshold: 5,
            token_threshold: usize::MAX,
            preserve_recent: 2,
            enable_progressive: false,
            ..CompactionConfig::balanced()
        };
        let (_dir, middleware) = middleware(config);
        let mut messages: Vec<Message> = (0..10)
            .map(|i| {
                let mut m = msg("tool", "", 10);
                m.tool_name = Some("grep_tool".into());
                m.content = format!("msg {i}");
                m
            })
            .collect();

        let metrics = middleware.compact(&mut messages);
        assert!(metrics.messages_after <= 2);
    }

    #[test]
    fn masking_offloads_large_tool_output_to_an_artifact() {
        let config = CompactionConfig {
            token_threshold: 0,
            message_threshold: 0,
            enable_flush: false,
            enable_pruning: false,
            enable_progressive: false,
            preserve_recent: 10,
            ..CompactionConfig::balanced()
        };
        let (dir, middleware) = middleware(config);
        let mut big = msg("tool", &"x".repeat(5000), 2000);
        big.tool_name = Some("grep_tool".into());
        let mut messages = vec![big, msg("user", "ok", 2)];

        let metrics = middleware.compact(&mut messages);
        assert_eq!(metrics.artifacts_created, 1);
        assert!(messages[0].content.starts_with("[artifact:"));
        assert!(messages[0].content.len() < 100);
        drop(dir);
    }

    #[test]
    fn progressive_stage_prepends_a_labeled_summary() {
        let config = CompactionConfig {
            token_threshold: 0,
            message_threshold: 0,
            enable_masking: false,
            enable_flush: false,
            enable_pruning: false,
            preserve_recent: 2,
            ..CompactionConfig::balanced()
        };
        let (_dir, middleware) = middleware(config);
        let mut messages: Vec<Message> =
            (0..10).map(|i| msg("user", &format!("message number {i}"), 50)).collect();

        let metrics = middleware.compact(&mut messages);
        assert_eq!(metrics.chunks_summarized, 1);
        assert!(messages[0].content.starts_with("[Previous conversation summary]"));
        // the two most recent messages survive untouched after the summary
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "message number 8");
        assert_eq!(messages[2].content, "message number 9");
    }

    #[test]
    fn compression_ratio_defaults_to_one_when_empty() {
        let metrics = CompactionMetrics::default();
        assert_eq!(metrics.compression_ratio(), 1.0);
    }
}
