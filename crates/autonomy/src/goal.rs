// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Goal registry: trigger matching against published events, rate-limited
//! autonomous execution, and YAML-file goal loading.

use crate::bus::Event;
use ag3nt_core::id::GoalId;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Medium
    }
}

impl RiskLevel {
    /// The fraction of full confidence this tier requires before the
    /// decision engine will act autonomously.
    pub fn threshold_multiplier(self) -> f64 {
        match self {
            Self::Low => 0.5,
            Self::Medium => 0.75,
            Self::High => 0.9,
            Self::Critical => 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trigger {
    pub event_type: String,
    #[serde(default)]
    pub filter: HashMap<String, Value>,
}

impl Trigger {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            filter: HashMap::new(),
        }
    }

    /// Matches the event type, then every filter entry against the
    /// event's payload. A filter value of `"regex:<pattern>"` is matched
    /// against the payload field's string form; any other value is
    /// compared for equality.
    pub fn matches(&self, event: &Event) -> bool {
        if self.event_type != event.event_type {
            return false;
        }
        for (key, expected) in &self.filter {
            let actual = event.payload.get(key).cloned().unwrap_or(Value::Null);
            if let Value::String(expected_str) = expected {
                if let Some(pattern) = expected_str.strip_prefix("regex:") {
                    let actual_str = value_to_display(&actual);
                    let matched = Regex::new(pattern)
                        .map(|re| re.is_match(&actual_str))
                        .unwrap_or(false);
                    if !matched {
                        return false;
                    }
                    continue;
                }
            }
            if &actual != expected {
                return false;
            }
        }
        true
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Shell,
    Notify,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: Option<ActionType>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Action {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            action_type: Some(ActionType::Shell),
            command: Some(command.into()),
            ..Default::default()
        }
    }

    pub fn notify(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_type: Some(ActionType::Notify),
            channel: Some(channel.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Substitutes `{{ event['payload']['field'] }}` placeholders with the
    /// matching payload field's value, returning a new rendered action.
    pub fn render(&self, event: &Event) -> Action {
        let re = Regex::new(r#"\{\{\s*event\['payload'\]\['(\w+)'\]\s*\}\}"#)
            .expect("render template regex is a fixed valid pattern");
        let substitute = |text: &str| -> String {
            re.replace_all(text, |caps: &regex::Captures<'_>| {
                event
                    .payload
                    .get(&caps[1])
                    .map(value_to_display)
                    .unwrap_or_default()
            })
            .into_owned()
        };
        Action {
            action_type: self.action_type,
            command: self.command.as_deref().map(substitute),
            channel: self.channel.clone(),
            message: self.message.as_deref().map(substitute),
            timeout_seconds: self.timeout_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_max_executions")]
    pub max_executions_per_hour: u32,
    #[serde(default = "default_max_executions")]
    pub max_executions_per_day: u32,
}

fn default_cooldown_seconds() -> u64 {
    300
}

fn default_max_executions() -> u32 {
    u32::MAX
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
            max_executions_per_hour: default_max_executions(),
            max_executions_per_day: default_max_executions(),
        }
    }
}

impl Limits {
    pub fn new(cooldown_seconds: u64, max_executions_per_hour: u32, max_executions_per_day: u32) -> Self {
        Self {
            cooldown_seconds,
            max_executions_per_hour,
            max_executions_per_day,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    pub action: Action,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing)]
    last_triggered: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    executions_this_hour: u32,
    #[serde(default, skip_serializing)]
    hour_reset: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    executions_today: u32,
    #[serde(default, skip_serializing)]
    day_reset: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn new(
        id: impl Into<GoalId>,
        name: impl Into<String>,
        description: impl Into<String>,
        trigger: Trigger,
        action: Action,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            trigger,
            action,
            risk_level: RiskLevel::default(),
            confidence_threshold: None,
            limits: Limits::default(),
            requires_approval: false,
            enabled: true,
            last_triggered: None,
            executions_this_hour: 0,
            hour_reset: None,
            executions_today: 0,
            day_reset: None,
        }
    }

    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_requires_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.enabled && self.trigger.matches(event)
    }

    /// Checks cooldown, then hourly, then daily limits, in that order.
    pub fn can_execute(&self) -> (bool, String) {
        let now = Utc::now();
        if let Some(last) = self.last_triggered {
            let elapsed = (now - last).num_seconds().max(0) as u64;
            if elapsed < self.limits.cooldown_seconds {
                return (false, "Cooldown active".to_string());
            }
        }

        let effective_hour_count = match self.hour_reset {
            Some(reset) if now < reset => self.executions_this_hour,
            _ => 0,
        };
        if effective_hour_count >= self.limits.max_executions_per_hour {
            return (false, "Hourly limit reached".to_string());
        }

        let effective_day_count = match self.day_reset {
            Some(reset) if now < reset => self.executions_today,
            _ => 0,
        };
        if effective_day_count >= self.limits.max_executions_per_day {
            return (false, "Daily limit reached".to_string());
        }

        (true, "OK".to_string())
    }

    /// Records an execution, resetting the hourly/daily windows lazily if
    /// their boundary has already passed.
    pub fn record_execution(&mut self) {
        let now = Utc::now();
        self.last_triggered = Some(now);

        match self.hour_reset {
            Some(reset) if now < reset => {}
            _ => {
                self.executions_this_hour = 0;
                self.hour_reset = Some(now + ChronoDuration::hours(1));
            }
        }
        self.executions_this_hour += 1;

        match self.day_reset {
            Some(reset) if now < reset => {}
            _ => {
                self.executions_today = 0;
                self.day_reset = Some(now + ChronoDuration::days(1));
            }
        }
        self.executions_today += 1;
    }

    pub fn to_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_dict(data: Value) -> Result<Goal, serde_json::Error> {
        serde_json::from_value(data)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalManagerStatus {
    pub total_goals: usize,
    pub enabled_goals: usize,
    pub emergency_stop: bool,
}

#[derive(Debug, Deserialize)]
struct GoalsFile {
    goals: Vec<Value>,
}

/// Holds goal definitions, matches events against their triggers, and
/// enforces an emergency stop that overrides every trigger match.
pub struct GoalManager {
    goals: Mutex<Vec<Goal>>,
    emergency_stop: AtomicBool,
}

impl Default for GoalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GoalManager {
    pub fn new() -> Self {
        Self {
            goals: Mutex::new(Vec::new()),
            emergency_stop: AtomicBool::new(false),
        }
    }

    pub fn add_goal(&self, goal: Goal) {
        let mut goals = self.goals.lock();
        goals.retain(|g| g.id != goal.id);
        goals.push(goal);
    }

    pub fn remove_goal(&self, id: &str) -> bool {
        let mut goals = self.goals.lock();
        let before = goals.len();
        goals.retain(|g| g.id != id);
        goals.len() != before
    }

    pub fn get_goal(&self, id: &str) -> Option<Goal> {
        self.goals.lock().iter().find(|g| g.id == id).cloned()
    }

    pub fn list_goals(&self) -> Vec<Goal> {
        self.goals.lock().clone()
    }

    /// Returns every enabled goal whose trigger matches `event` and whose
    /// rate limits currently allow execution. Always empty while the
    /// emergency stop is set.
    pub fn find_matching_goals(&self, event: &Event) -> Vec<Goal> {
        if self.emergency_stop.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.goals
            .lock()
            .iter()
            .filter(|g| g.matches(event) && g.can_execute().0)
            .cloned()
            .collect()
    }

    pub fn set_emergency_stop(&self, stopped: bool) {
        self.emergency_stop.store(stopped, Ordering::SeqCst);
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    pub fn enable_goal(&self, id: &str) -> bool {
        self.set_enabled(id, true)
    }

    pub fn disable_goal(&self, id: &str) -> bool {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut goals = self.goals.lock();
        match goals.iter_mut().find(|g| g.id == id) {
            Some(goal) => {
                goal.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Records a completed autonomous execution against the stored goal,
    /// updating its cooldown/hourly/daily bookkeeping in place.
    pub fn record_execution(&self, id: &str) -> bool {
        let mut goals = self.goals.lock();
        match goals.iter_mut().find(|g| g.id == id) {
            Some(goal) => {
                goal.record_execution();
                true
            }
            None => false,
        }
    }

    pub fn get_status(&self) -> GoalManagerStatus {
        let goals = self.goals.lock();
        GoalManagerStatus {
            total_goals: goals.len(),
            enabled_goals: goals.iter().filter(|g| g.enabled).count(),
            emergency_stop: self.emergency_stop.load(Ordering::SeqCst),
        }
    }

    /// Loads every `*.yaml`/`*.yml` file in `dir`, each holding a
    /// top-level `goals:` list. Malformed files are logged and skipped,
    /// not fatal.
    pub fn load_goals(&self, dir: &Path) -> std::io::Result<usize> {
        let mut loaded = 0;
        let entries = std::fs::read_dir(dir)?;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if !is_yaml {
                continue;
            }
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable goal file");
                    continue;
                }
            };
            let file: GoalsFile = match serde_yaml::from_str(&text) {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping malformed goal file");
                    continue;
                }
            };
            for raw in file.goals {
                match Goal::from_dict(raw) {
                    Ok(goal) => {
                        self.add_goal(goal);
                        loaded += 1;
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), %err, "skipping malformed goal entry");
                    }
                }
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_check_event(success: bool) -> Event {
        Event::new("http_check", "monitor").with_payload(serde_json::json!({"success": success}))
    }

    #[test]
    fn trigger_matches_simple_event_type() {
        let trigger = Trigger::new("http_check");
        assert!(trigger.matches(&Event::new("http_check", "monitor")));
        assert!(!trigger.matches(&Event::new("file_change", "watcher")));
    }

    #[test]
    fn trigger_matches_with_literal_filter() {
        let mut trigger = Trigger::new("http_check");
        trigger.filter.insert("success".to_string(), serde_json::json!(false));
        assert!(trigger.matches(&http_check_event(false)));
        assert!(!trigger.matches(&http_check_event(true)));
    }

    #[test]
    fn trigger_matches_with_regex_filter() {
        let mut trigger = Trigger::new("http_check");
        trigger.filter.insert(
            "url".to_string(),
            Value::String(r"regex:https?://mysite\.com.*".to_string()),
        );
        let matching = Event::new("http_check", "monitor")
            .with_payload(serde_json::json!({"url": "https://mysite.com/health"}));
        let non_matching = Event::new("http_check", "monitor")
            .with_payload(serde_json::json!({"url": "https://other.com/health"}));
        assert!(trigger.matches(&matching));
        assert!(!trigger.matches(&non_matching));
    }

    #[test]
    fn action_render_substitutes_payload_field() {
        let action = Action::shell("echo {{ event['payload']['message'] }}");
        let event = Event::new("test", "test").with_payload(serde_json::json!({"message": "Hello World"}));
        let rendered = action.render(&event);
        assert!(rendered.command.unwrap().contains("Hello World"));
    }

    fn sample_goal() -> Goal {
        Goal::new(
            "test-goal",
            "Test Goal",
            "A test goal",
            Trigger::new("http_check"),
            Action::shell("echo test"),
        )
        .with_risk_level(RiskLevel::Medium)
        .with_confidence_threshold(0.75)
        .with_limits(Limits::new(300, 5, 20))
    }

    #[test]
    fn goal_matches_respects_enabled_flag() {
        let mut goal = sample_goal();
        goal.trigger.filter.insert("success".to_string(), serde_json::json!(false));
        assert!(goal.matches(&http_check_event(false)));
        goal.enabled = false;
        assert!(!goal.matches(&http_check_event(false)));
    }

    #[test]
    fn can_execute_ok_when_no_limits_hit() {
        let goal = sample_goal();
        let (can_exec, reason) = goal.can_execute();
        assert!(can_exec);
        assert_eq!(reason, "OK");
    }

    #[test]
    fn can_execute_blocked_during_cooldown() {
        let mut goal = sample_goal();
        goal.last_triggered = Some(Utc::now());
        let (can_exec, reason) = goal.can_execute();
        assert!(!can_exec);
        assert!(reason.contains("Cooldown"));
    }

    #[test]
    fn can_execute_blocked_at_hourly_limit() {
        let mut goal = sample_goal();
        goal.executions_this_hour = 5;
        goal.hour_reset = Some(Utc::now() + ChronoDuration::minutes(30));
        let (can_exec, reason) = goal.can_execute();
        assert!(!can_exec);
        assert!(reason.contains("Hourly limit"));
    }

    #[test]
    fn can_execute_blocked_at_daily_limit() {
        let mut goal = sample_goal();
        goal.executions_today = 20;
        goal.day_reset = Some(Utc::now() + ChronoDuration::hours(12));
        let (can_exec, reason) = goal.can_execute();
        assert!(!can_exec);
        assert!(reason.contains("Daily limit"));
    }

    #[test]
    fn record_execution_updates_counters() {
        let mut goal = sample_goal();
        goal.record_execution();
        assert!(goal.last_triggered.is_some());
        assert_eq!(goal.executions_this_hour, 1);
        assert_eq!(goal.executions_today, 1);
    }

    #[test]
    fn to_dict_serializes_risk_level_lowercase() {
        let goal = sample_goal();
        let data = goal.to_dict();
        assert_eq!(data["id"], "test-goal");
        assert_eq!(data["name"], "Test Goal");
        assert_eq!(data["risk_level"], "medium");
    }

    #[test]
    fn from_dict_round_trips_risk_level_and_trigger() {
        let data = serde_json::json!({
            "id": "test-goal",
            "name": "Test Goal",
            "description": "A test",
            "trigger": {"event_type": "http_check", "filter": {"success": false}},
            "action": {"type": "shell", "command": "echo test", "timeout_seconds": 60},
            "risk_level": "high",
            "confidence_threshold": 0.9
        });
        let goal = Goal::from_dict(data).unwrap();
        assert_eq!(goal.id, "test-goal");
        assert_eq!(goal.risk_level, RiskLevel::High);
        assert_eq!(goal.trigger.event_type, "http_check");
    }

    #[test]
    fn manager_add_get_remove_goal() {
        let manager = GoalManager::new();
        manager.add_goal(sample_goal());
        assert!(manager.get_goal("test-goal").is_some());
        assert!(manager.remove_goal("test-goal"));
        assert!(manager.get_goal("test-goal").is_none());
        assert!(!manager.remove_goal("nonexistent"));
    }

    #[test]
    fn manager_find_matching_goals_respects_emergency_stop() {
        let manager = GoalManager::new();
        manager.add_goal(Goal::new(
            "test-goal",
            "Test Goal",
            "A test goal",
            Trigger::new("http_check"),
            Action::shell("echo test"),
        ));

        let event = Event::new("http_check", "monitor");
        assert_eq!(manager.find_matching_goals(&event).len(), 1);

        manager.set_emergency_stop(true);
        assert_eq!(manager.find_matching_goals(&event).len(), 0);
    }

    #[test]
    fn manager_enable_disable_goal() {
        let manager = GoalManager::new();
        manager.add_goal(Goal::new(
            "test-goal",
            "Test Goal",
            "A test goal",
            Trigger::new("http_check"),
            Action::shell("echo test"),
        ));
        manager.disable_goal("test-goal");
        assert!(!manager.get_goal("test-goal").unwrap().enabled);
        manager.enable_goal("test-goal");
        assert!(manager.get_goal("test-goal").unwrap().enabled);
    }

    #[test]
    fn manager_get_status_counts_goals() {
        let manager = GoalManager::new();
        manager.add_goal(Goal::new(
            "test-goal",
            "Test Goal",
            "A test goal",
            Trigger::new("http_check"),
            Action::shell("echo test"),
        ));
        let status = manager.get_status();
        assert_eq!(status.total_goals, 1);
        assert_eq!(status.enabled_goals, 1);
        assert!(!status.emergency_stop);
    }

    #[test]
    fn manager_record_execution_updates_the_stored_goal() {
        let manager = GoalManager::new();
        manager.add_goal(Goal::new(
            "test-goal",
            "Test Goal",
            "A test goal",
            Trigger::new("http_check"),
            Action::shell("echo test"),
        ));
        assert!(manager.record_execution("test-goal"));
        let goal = manager.get_goal("test-goal").unwrap();
        assert!(!goal.can_execute().0);
        assert!(!manager.record_execution("missing-goal"));
    }

    #[test]
    fn manager_loads_goals_from_yaml_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("goals.yaml"),
            "goals:\n  - id: yaml-goal\n    name: YAML Goal\n    description: Loaded from YAML\n    trigger:\n      event_type: test\n    action:\n      type: shell\n      command: echo test\n    risk_level: low\n",
        )
        .unwrap();

        let manager = GoalManager::new();
        manager.load_goals(dir.path()).unwrap();

        let goal = manager.get_goal("yaml-goal").unwrap();
        assert_eq!(goal.name, "YAML Goal");
        assert_eq!(goal.risk_level, RiskLevel::Low);
    }

    #[test]
    fn risk_level_threshold_multipliers_match_table() {
        assert_eq!(RiskLevel::Low.threshold_multiplier(), 0.5);
        assert_eq!(RiskLevel::Medium.threshold_multiplier(), 0.75);
        assert_eq!(RiskLevel::High.threshold_multiplier(), 0.9);
        assert_eq!(RiskLevel::Critical.threshold_multiplier(), 1.0);
    }
}
