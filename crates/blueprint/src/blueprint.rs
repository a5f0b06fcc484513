// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PRP-style structured blueprints: goal/why/what, tasks with validation
//! gates, context (code references, anti-patterns, gotchas), persisted
//! one JSON file per blueprint.

use ag3nt_core::id::BlueprintId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("blueprint not found: {0}")]
    NotFound(String),
    #[error("task index {index} out of range (blueprint has {len} tasks)")]
    InvalidTaskIndex { index: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintStatus {
    Draft,
    Approved,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Syntax = 1,
    UnitTest = 2,
    Integration = 3,
}

impl ValidationLevel {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Syntax),
            2 => Some(Self::UnitTest),
            3 => Some(Self::Integration),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Syntax => "Syntax",
            Self::UnitTest => "Unit Test",
            Self::Integration => "Integration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    Manual,
    Lint,
    Test,
    TypeCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCriterion {
    pub description: String,
    #[serde(default)]
    pub validation_command: Option<String>,
    #[serde(default = "default_validation_type")]
    pub validation_type: ValidationType,
}

fn default_validation_type() -> ValidationType {
    ValidationType::Manual
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeReference {
    pub file_path: String,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub relevance: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntiPattern {
    pub description: String,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pseudocode: String,
    #[serde(default)]
    pub files_involved: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<usize>,
    #[serde(default = "default_validation_gate")]
    pub validation_gate: u8,
    #[serde(default = "default_complexity")]
    pub complexity: TaskComplexity,
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub validation_result: String,
}

fn default_validation_gate() -> u8 {
    1
}

fn default_complexity() -> TaskComplexity {
    TaskComplexity::Medium
}

fn default_task_status() -> TaskStatus {
    TaskStatus::Pending
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationGate {
    pub level: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub results: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlueprint {
    pub id: BlueprintId,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub what: String,
    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,

    #[serde(default)]
    pub code_references: Vec<CodeReference>,
    #[serde(default)]
    pub documentation_refs: Vec<String>,
    #[serde(default)]
    pub anti_patterns: Vec<AntiPattern>,
    #[serde(default)]
    pub gotchas: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<String>,

    #[serde(default)]
    pub tasks: Vec<BlueprintTask>,
    #[serde(default)]
    pub validation_gates: Vec<ValidationGate>,

    pub status: BlueprintStatus,
    #[serde(default)]
    pub current_task_index: usize,
}

impl ContextBlueprint {
    pub fn new(session_id: impl Into<String>, goal: impl Into<String>, why: impl Into<String>, what: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: BlueprintId::new(format!("bp_{}", short_uuid())),
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            goal: goal.into(),
            why: why.into(),
            what: what.into(),
            success_criteria: Vec::new(),
            code_references: Vec::new(),
            documentation_refs: Vec::new(),
            anti_patterns: Vec::new(),
            gotchas: Vec::new(),
            learnings: Vec::new(),
            tasks: Vec::new(),
            validation_gates: Vec::new(),
            status: BlueprintStatus::Draft,
            current_task_index: 0,
        }
    }

    /// Derives the distinct validation gates implied by the tasks' gate levels.
    pub fn derive_validation_gates(&mut self) {
        let mut levels: Vec<u8> = self.tasks.iter().map(|t| t.validation_gate).collect();
        levels.sort_unstable();
        levels.dedup();
        self.validation_gates = levels
            .into_iter()
            .map(|level| ValidationGate {
                level,
                name: ValidationLevel::from_u8(level)
                    .map(|v| v.label().to_string())
                    .unwrap_or_else(|| format!("Level {level}")),
                ..Default::default()
            })
            .collect();
    }

    /// Updates a task's status/notes, advancing `current_task_index` and
    /// the overall blueprint status as the Python original does.
    pub fn update_task(
        &mut self,
        task_index: usize,
        status: TaskStatus,
        notes: Option<String>,
        validation_result: Option<String>,
    ) -> Result<(), BlueprintError> {
        if task_index >= self.tasks.len() {
            return Err(BlueprintError::InvalidTaskIndex {
                index: task_index,
                len: self.tasks.len(),
            });
        }

        {
            let task = &mut self.tasks[task_index];
            task.status = status;
            if let Some(notes) = notes {
                if !notes.is_empty() {
                    task.notes = notes;
                }
            }
            if let Some(result) = validation_result {
                if !result.is_empty() {
                    task.validation_result = result;
                }
            }
        }

        if matches!(status, TaskStatus::Completed) && task_index == self.current_task_index {
            self.current_task_index = (task_index + 1).min(self.tasks.len() - 1);
        }

        if matches!(status, TaskStatus::InProgress) && self.status == BlueprintStatus::Draft {
            self.status = BlueprintStatus::InProgress;
        } else if self
            .tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Skipped))
        {
            self.status = BlueprintStatus::Completed;
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("# Blueprint: {}", self.goal));
        lines.push(format!("\n**Status:** {:?}", self.status));
        lines.push(format!("**ID:** {}", self.id));
        lines.push(format!("**Session:** {}", self.session_id));

        if !self.why.is_empty() {
            lines.push(format!("\n## Why\n{}", self.why));
        }
        if !self.what.is_empty() {
            lines.push(format!("\n## What\n{}", self.what));
        }

        if !self.success_criteria.is_empty() {
            lines.push("\n## Success Criteria".to_string());
            for sc in &self.success_criteria {
                let cmd = sc
                    .validation_command
                    .as_ref()
                    .map(|c| format!(" (`{c}`)"))
                    .unwrap_or_default();
                lines.push(format!("- [{:?}] {}{}", sc.validation_type, sc.description, cmd));
            }
        }

        if !self.tasks.is_empty() {
            lines.push("\n## Tasks".to_string());
            for (i, task) in self.tasks.iter().enumerate() {
                let check = if matches!(task.status, TaskStatus::Completed) { "[x]" } else { "[ ]" };
                let arrow = if i == self.current_task_index && self.status == BlueprintStatus::InProgress {
                    " <-- CURRENT"
                } else {
                    ""
                };
                lines.push(format!("{}. {} **{}** ({:?}){}", i + 1, check, task.title, task.complexity, arrow));
                if !task.description.is_empty() {
                    lines.push(format!("   {}", task.description));
                }
                if !task.files_involved.is_empty() {
                    lines.push(format!("   Files: {}", task.files_involved.join(", ")));
                }
            }
        }

        if !self.anti_patterns.is_empty() {
            lines.push("\n## Anti-Patterns".to_string());
            for ap in &self.anti_patterns {
                lines.push(format!("- {}", ap.description));
            }
        }

        if !self.gotchas.is_empty() {
            lines.push("\n## Gotchas".to_string());
            for g in &self.gotchas {
                lines.push(format!("- {g}"));
            }
        }

        lines.join("\n")
    }
}

fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Persists one JSON file per blueprint under `storage_dir`.
pub struct BlueprintStore {
    storage_dir: PathBuf,
}

impl BlueprintStore {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.storage_dir.join(format!("{id}.json"))
    }

    pub fn save(&self, blueprint: &ContextBlueprint) -> Result<(), BlueprintError> {
        std::fs::create_dir_all(&self.storage_dir)?;
        let path = self.path_for(blueprint.id.as_str());
        std::fs::write(path, serde_json::to_string_pretty(blueprint)?)?;
        Ok(())
    }

    pub fn load(&self, blueprint_id: &str) -> Option<ContextBlueprint> {
        let path = self.path_for(blueprint_id);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(bp) => Some(bp),
                Err(err) => {
                    tracing::warn!(blueprint_id, %err, "failed to parse blueprint");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(blueprint_id, %err, "failed to read blueprint file");
                None
            }
        }
    }

    /// Loads the most recently updated blueprint for a session.
    pub fn load_for_session(&self, session_id: &str) -> Option<ContextBlueprint> {
        if !self.storage_dir.exists() {
            return None;
        }
        let mut best: Option<ContextBlueprint> = None;
        for entry in std::fs::read_dir(&self.storage_dir).ok()?.flatten() {
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if let Some(bp) = self.load(&stem) {
                if bp.session_id == session_id {
                    if best.as_ref().map(|b| bp.updated_at > b.updated_at).unwrap_or(true) {
                        best = Some(bp);
                    }
                }
            }
        }
        best
    }

    pub fn list_recent(&self, limit: usize) -> Vec<ContextBlueprint> {
        let Ok(entries) = std::fs::read_dir(&self.storage_dir) else {
            return Vec::new();
        };
        let mut blueprints: Vec<ContextBlueprint> = entries
            .flatten()
            .filter_map(|entry| entry.path().file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .filter_map(|stem| self.load(&stem))
            .collect();
        blueprints.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        blueprints.truncate(limit);
        blueprints
    }
}

/// Tracks the active blueprint id per session, so tools can resolve
/// "the current blueprint" without a global singleton.
pub struct BlueprintManager {
    store: BlueprintStore,
    active: Mutex<std::collections::HashMap<String, String>>,
}

impl BlueprintManager {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: BlueprintStore::new(storage_dir),
            active: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn store(&self) -> &BlueprintStore {
        &self.store
    }

    pub fn create(&self, session_id: &str, blueprint: ContextBlueprint) -> Result<ContextBlueprint, BlueprintError> {
        self.store.save(&blueprint)?;
        self.active.lock().insert(session_id.to_string(), blueprint.id.as_str().to_string());
        Ok(blueprint)
    }

    pub fn active_for_session(&self, session_id: &str) -> Option<ContextBlueprint> {
        let id = self.active.lock().get(session_id).cloned();
        match id {
            Some(id) => self.store.load(&id),
            None => self.store.load_for_session(session_id),
        }
    }

    pub fn update_task(
        &self,
        session_id: &str,
        blueprint_id: Option<&str>,
        task_index: usize,
        status: TaskStatus,
        notes: Option<String>,
        validation_result: Option<String>,
    ) -> Result<ContextBlueprint, BlueprintError> {
        let mut bp = match blueprint_id {
            Some(id) => self.store.load(id).ok_or_else(|| BlueprintError::NotFound(id.to_string()))?,
            None => self
                .active_for_session(session_id)
                .ok_or_else(|| BlueprintError::NotFound("active".to_string()))?,
        };
        bp.update_task(task_index, status, notes, validation_result)?;
        self.store.save(&bp)?;
        Ok(bp)
    }
}
