// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage 2 of compaction: regex-based insight extraction written to a
//! daily markdown memory log before the triggering messages are pruned.
//!
//! Extraction is heuristic, not LLM-driven: four fixed pattern groups
//! (decisions, preferences, facts, solutions) are matched case-
//! insensitively against each message's content, each capped at
//! `max_insights` matches.

use crate::Message;
use chrono::Utc;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct FlushConfig {
    pub enabled: bool,
    pub soft_threshold: usize,
    pub reserve_tokens: usize,
    pub flush_buffer: usize,
    pub max_insights: usize,
    pub extract_decisions: bool,
    pub extract_preferences: bool,
    pub extract_facts: bool,
    pub extract_solutions: bool,
    pub memory_dir: Option<PathBuf>,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl FlushConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::balanced()
        }
    }

    pub fn conservative() -> Self {
        Self {
            soft_threshold: 120_000,
            reserve_tokens: 30_000,
            ..Self::balanced()
        }
    }

    pub fn balanced() -> Self {
        Self {
            enabled: true,
            soft_threshold: 80_000,
            reserve_tokens: 20_000,
            flush_buffer: 4_000,
            max_insights: 10,
            extract_decisions: true,
            extract_preferences: true,
            extract_facts: true,
            extract_solutions: true,
            memory_dir: None,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            soft_threshold: 50_000,
            reserve_tokens: 15_000,
            flush_buffer: 2_000,
            ..Self::balanced()
        }
    }

    pub fn should_flush(&self, token_count: usize) -> bool {
        self.enabled
            && token_count
                >= self
                    .soft_threshold
                    .saturating_sub(self.reserve_tokens)
                    .saturating_sub(self.flush_buffer)
    }
}

fn decision_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile_all(&[
            r"(?i)we (?:decided|chose|opted) to (.+)",
            r"(?i)decision:\s*(.+)",
            r"(?i)going with (.+) instead of",
            r"(?i)the plan is to (.+)",
        ])
    })
}

fn preference_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile_all(&[
            r"(?i)i prefer (.+)",
            r"(?i)please always (.+)",
            r"(?i)from now on,? (.+)",
            r"(?i)my preference is (.+)",
        ])
    })
}

fn fact_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile_all(&[
            r"(?i)note that (.+)",
            r"(?i)important:\s*(.+)",
            r"(?i)keep in mind (.+)",
            r"(?i)fyi,? (.+)",
        ])
    })
}

fn solution_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile_all(&[
            r"(?i)fixed by (.+)",
            r"(?i)the fix was (.+)",
            r"(?i)resolved by (.+)",
            r"(?i)solution:\s*(.+)",
        ])
    })
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}

fn extract(content: &str, patterns: &[Regex], cap: usize) -> Vec<String> {
    let mut out = Vec::new();
    'outer: for pattern in patterns {
        for capture in pattern.captures_iter(content) {
            if let Some(m) = capture.get(1) {
                out.push(m.as_str().trim().to_string());
                if out.len() >= cap {
                    break 'outer;
                }
            }
        }
    }
    out
}

pub struct MemoryFlusher {
    config: FlushConfig,
}

impl MemoryFlusher {
    pub fn new(config: FlushConfig) -> Self {
        Self { config }
    }

    pub fn flush(&self, messages: &[Message]) -> Option<FlushResult> {
        if !self.config.enabled {
            return None;
        }

        let mut decisions = Vec::new();
        let mut preferences = Vec::new();
        let mut facts = Vec::new();
        let mut solutions = Vec::new();

        for message in messages {
            if self.config.extract_decisions && decisions.len() < self.config.max_insights {
                decisions.extend(extract(
                    &message.content,
                    decision_patterns(),
                    self.config.max_insights - decisions.len(),
                ));
            }
            if self.config.extract_preferences && preferences.len() < self.config.max_insights {
                preferences.extend(extract(
                    &message.content,
                    preference_patterns(),
                    self.config.max_insights - preferences.len(),
                ));
            }
            if self.config.extract_facts && facts.len() < self.config.max_insights {
                facts.extend(extract(
                    &message.content,
                    fact_patterns(),
                    self.config.max_insights - facts.len(),
                ));
            }
            if self.config.extract_solutions && solutions.len() < self.config.max_insights {
                solutions.extend(extract(
                    &message.content,
                    solution_patterns(),
                    self.config.max_insights - solutions.len(),
                ));
            }
        }

        let total = decisions.len() + preferences.len() + facts.len() + solutions.len();
        if total == 0 {
            return Some(FlushResult {
                total_insights: 0,
            });
        }

        if let Some(dir) = &self.config.memory_dir {
            let _ = self.write_to_memory(dir, &decisions, &preferences, &facts, &solutions);
        }

        Some(FlushResult {
            total_insights: total,
        })
    }

    fn write_to_memory(
        &self,
        dir: &std::path::Path,
        decisions: &[String],
        preferences: &[String],
        facts: &[String],
        solutions: &[String],
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let now = Utc::now();
        let path = dir.join(format!("{}.md", now.format("%Y-%m-%d")));

        let mut body = format!("\n## Auto-flush at {}\n", now.format("%H:%M"));
        write_section(&mut body, "Decisions", decisions);
        write_section(&mut body, "User Preferences", preferences);
        write_section(&mut body, "Key Facts", facts);
        write_section(&mut body, "Solutions", solutions);

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(body.as_bytes())
    }
}

fn write_section(body: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    body.push_str(&format!("### {title}\n"));
    for item in items {
        body.push_str(&format!("- {item}\n"));
    }
}

/// Public result handed back to the compaction pipeline.
pub struct FlushResult {
    pub total_insights: usize,
}
