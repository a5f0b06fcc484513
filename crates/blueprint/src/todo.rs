// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat task list: a lighter-weight sibling to [`crate::blueprint`] for
//! plans that don't need validation gates or PRP structure. Persists as
//! a single JSON file, written atomically via a temp-file rename.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub notes: String,
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TodoFile {
    #[serde(default)]
    tasks: Vec<Task>,
}

pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub parent_id: Option<String>,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            status: None,
            priority: None,
            parent_id: None,
        }
    }
}

/// Persistent task list with create/update/delete and markdown/JSON export.
pub struct TodoStore {
    storage_path: PathBuf,
    tasks: Mutex<HashMap<String, Task>>,
}

impl TodoStore {
    pub fn open(storage_path: impl Into<PathBuf>) -> Result<Self, TodoError> {
        let storage_path = storage_path.into();
        let tasks = Self::load(&storage_path)?;
        Ok(Self {
            storage_path,
            tasks: Mutex::new(tasks),
        })
    }

    fn load(path: &Path) -> Result<HashMap<String, Task>, TodoError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let text = std::fs::read_to_string(path)?;
        match serde_json::from_str::<TodoFile>(&text) {
            Ok(file) => Ok(file.tasks.into_iter().map(|t| (t.id.clone(), t)).collect()),
            Err(err) => {
                tracing::warn!(%err, "todo storage file is corrupt, starting fresh");
                Ok(HashMap::new())
            }
        }
    }

    fn save_locked(&self, tasks: &HashMap<String, Task>) -> Result<(), TodoError> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = TodoFile {
            tasks: tasks.values().cloned().collect(),
        };
        let tmp_path = self.storage_path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(&file).map_err(std::io::Error::other)?)?;
        std::fs::rename(&tmp_path, &self.storage_path)?;
        Ok(())
    }

    pub fn create_task(&self, title: impl Into<String>, priority: Priority, parent_id: Option<String>, notes: impl Into<String>) -> Result<Task, TodoError> {
        let now = Utc::now();
        let task = Task {
            id: format!("task_{}", short_uuid()),
            title: title.into(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            priority,
            parent_id,
            notes: notes.into(),
        };

        let mut tasks = self.tasks.lock();
        tasks.insert(task.id.clone(), task.clone());
        self.save_locked(&tasks)?;
        Ok(task)
    }

    pub fn update_task(
        &self,
        task_id: &str,
        status: Option<TaskStatus>,
        title: Option<String>,
        notes: Option<String>,
        priority: Option<Priority>,
    ) -> Result<Task, TodoError> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(task_id).ok_or_else(|| TodoError::NotFound(task_id.to_string()))?;
        if let Some(status) = status {
            task.status = status;
        }
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(notes) = notes {
            task.notes = notes;
        }
        if let Some(priority) = priority {
            task.priority = priority;
        }
        task.updated_at = Utc::now();
        let updated = task.clone();
        self.save_locked(&tasks)?;
        Ok(updated)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<bool, TodoError> {
        let mut tasks = self.tasks.lock();
        if tasks.remove(task_id).is_some() {
            self.save_locked(&tasks)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().get(task_id).cloned()
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let tasks = self.tasks.lock();
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| filter.parent_id.as_deref().map_or(true, |p| t.parent_id.as_deref() == Some(p)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched
    }

    pub fn clear_completed(&self) -> Result<usize, TodoError> {
        let mut tasks = self.tasks.lock();
        let completed_ids: Vec<String> = tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Completed))
            .map(|t| t.id.clone())
            .collect();
        for id in &completed_ids {
            tasks.remove(id);
        }
        if !completed_ids.is_empty() {
            self.save_locked(&tasks)?;
        }
        Ok(completed_ids.len())
    }

    pub fn to_markdown(&self) -> String {
        let tasks: Vec<Task> = self.tasks.lock().values().cloned().collect();
        let mut lines = vec!["# Tasks\n".to_string()];

        for status in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed, TaskStatus::Blocked] {
            let mut group: Vec<&Task> = tasks.iter().filter(|t| t.status == status).collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            lines.push(format!("\n## {:?}\n", status));
            for task in group {
                let checkbox = if matches!(task.status, TaskStatus::Completed) { "[x]" } else { "[ ]" };
                lines.push(format!("- {} **{}** ({:?})", checkbox, task.title, task.priority));
                if !task.notes.is_empty() {
                    lines.push(format!("  - {}", task.notes));
                }
            }
        }

        lines.join("\n")
    }

    pub fn to_json(&self) -> Result<String, TodoError> {
        let tasks: Vec<Task> = self.tasks.lock().values().cloned().collect();
        serde_json::to_string_pretty(&TodoFile { tasks }).map_err(|e| TodoError::Io(std::io::Error::other(e)))
    }
}

pub fn default_storage_path() -> PathBuf {
    dirs_home().join(".ag3nt").join("todos.json")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::open(dir.path().join("todos.json")).unwrap();
        let task = store.create_task("Write the docs", Priority::High, None, "").unwrap();
        let fetched = store.get_task(&task.id).unwrap();
        assert_eq!(fetched.title, "Write the docs");
        assert_eq!(fetched.priority, Priority::High);
    }

    #[test]
    fn update_task_changes_status_and_notes() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::open(dir.path().join("todos.json")).unwrap();
        let task = store.create_task("Ship it", Priority::Medium, None, "").unwrap();
        let updated = store
            .update_task(&task.id, Some(TaskStatus::InProgress), None, Some("started".to_string()), None)
            .unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.notes, "started");
    }

    #[test]
    fn update_missing_task_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::open(dir.path().join("todos.json")).unwrap();
        let err = store.update_task("missing", Some(TaskStatus::Completed), None, None, None).unwrap_err();
        assert!(matches!(err, TodoError::NotFound(_)));
    }

    #[test]
    fn delete_task_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::open(dir.path().join("todos.json")).unwrap();
        let task = store.create_task("Temp", Priority::Low, None, "").unwrap();
        assert!(store.delete_task(&task.id).unwrap());
        assert!(store.get_task(&task.id).is_none());
        assert!(!store.delete_task(&task.id).unwrap());
    }

    #[test]
    fn list_tasks_filters_by_status_and_priority() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::open(dir.path().join("todos.json")).unwrap();
        let a = store.create_task("A", Priority::High, None, "").unwrap();
        store.create_task("B", Priority::Low, None, "").unwrap();
        store.update_task(&a.id, Some(TaskStatus::Completed), None, None, None).unwrap();

        let completed = store.list_tasks(&TaskFilter {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        });
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, a.id);

        let high_priority = store.list_tasks(&TaskFilter {
            priority: Some(Priority::High),
            ..Default::default()
        });
        assert_eq!(high_priority.len(), 1);
    }

    #[test]
    fn clear_completed_removes_only_completed_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::open(dir.path().join("todos.json")).unwrap();
        let a = store.create_task("A", Priority::Medium, None, "").unwrap();
        store.create_task("B", Priority::Medium, None, "").unwrap();
        store.update_task(&a.id, Some(TaskStatus::Completed), None, None, None).unwrap();

        let removed = store.clear_completed().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list_tasks(&TaskFilter::default()).len(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todos.json");
        {
            let store = TodoStore::open(&path).unwrap();
            store.create_task("Persisted", Priority::Medium, None, "").unwrap();
        }
        let reopened = TodoStore::open(&path).unwrap();
        assert_eq!(reopened.list_tasks(&TaskFilter::default()).len(), 1);
    }

    #[test]
    fn corrupt_file_starts_fresh_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todos.json");
        std::fs::write(&path, "not json").unwrap();
        let store = TodoStore::open(&path).unwrap();
        assert_eq!(store.list_tasks(&TaskFilter::default()).len(), 0);
    }

    #[test]
    fn to_markdown_groups_by_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = TodoStore::open(dir.path().join("todos.json")).unwrap();
        store.create_task("Pending task", Priority::Medium, None, "").unwrap();
        let markdown = store.to_markdown();
        assert!(markdown.contains("Pending"));
        assert!(markdown.contains("Pending task"));
    }
}
