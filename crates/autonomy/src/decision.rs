// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Risk-tiered decision engine: turns a goal match plus a historical
//! confidence score into one of ACT/ASK/DEFER/ESCALATE/REJECT, and keeps
//! a bounded audit trail of every decision made.

use crate::bus::Event;
use crate::goal::{Goal, RiskLevel};
use ag3nt_core::id::DecisionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Historical performance of a goal's action, as computed by the learning
/// collaborator from past outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub score: f64,
    pub sample_count: u32,
    pub success_rate: f64,
    pub avg_duration_ms: u64,
}

impl ConfidenceScore {
    pub fn new(score: f64, sample_count: u32, success_rate: f64, avg_duration_ms: u64) -> Self {
        Self {
            score,
            sample_count,
            success_rate,
            avg_duration_ms,
        }
    }
}

/// Supplies historical confidence for a goal/event-type pair. Backed in
/// production by the learning engine's outcome store; stubbed in tests.
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn get_confidence(&self, goal_id: &str, event_type: &str) -> ConfidenceScore;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Act,
    Ask,
    Defer,
    Escalate,
    Reject,
}

impl DecisionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Act => "act",
            Self::Ask => "ask",
            Self::Defer => "defer",
            Self::Escalate => "escalate",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub decision_id: DecisionId,
    pub decision_type: DecisionType,
    pub goal: Goal,
    pub event: Event,
    pub confidence: ConfidenceScore,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn should_execute(&self) -> bool {
        self.decision_type == DecisionType::Act
    }

    pub fn needs_approval(&self) -> bool {
        self.decision_type == DecisionType::Ask
    }

    pub fn to_dict(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.insert("goal_id".to_string(), serde_json::Value::String(self.goal.id.as_str().to_string()));
        }
        value
    }
}

#[derive(Debug, Clone)]
pub struct DecisionConfig {
    pub low_risk_threshold: f64,
    pub medium_risk_threshold: f64,
    pub high_risk_threshold: f64,
    pub critical_risk_threshold: f64,
    pub min_samples_required: u32,
    pub reject_threshold: f64,
    pub escalate_after_failures: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            low_risk_threshold: 0.5,
            medium_risk_threshold: 0.75,
            high_risk_threshold: 0.9,
            critical_risk_threshold: 1.0,
            min_samples_required: 3,
            reject_threshold: 0.1,
            escalate_after_failures: 3,
        }
    }
}

impl DecisionConfig {
    pub fn threshold_for(&self, risk_level: RiskLevel) -> f64 {
        match risk_level {
            RiskLevel::Low => self.low_risk_threshold,
            RiskLevel::Medium => self.medium_risk_threshold,
            RiskLevel::High => self.high_risk_threshold,
            RiskLevel::Critical => self.critical_risk_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionStats {
    pub total: usize,
    pub act_rate: f64,
    pub ask_rate: f64,
    pub defer_rate: f64,
    pub escalate_rate: f64,
    pub reject_rate: f64,
}

/// Bounded ring buffer of every decision made, queryable by goal or type.
pub struct DecisionAuditLog {
    log: Mutex<VecDeque<Decision>>,
    max_entries: usize,
}

impl Default for DecisionAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionAuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(1000)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            log: Mutex::new(VecDeque::new()),
            max_entries,
        }
    }

    pub fn record(&self, decision: Decision) {
        let mut log = self.log.lock();
        log.push_back(decision);
        while log.len() > self.max_entries {
            log.pop_front();
        }
    }

    pub fn get_recent(&self, limit: usize) -> Vec<Decision> {
        let log = self.log.lock();
        log.iter().rev().take(limit).cloned().collect()
    }

    pub fn get_by_goal(&self, goal_id: &str) -> Vec<Decision> {
        self.log.lock().iter().filter(|d| d.goal.id == goal_id).cloned().collect()
    }

    pub fn get_by_type(&self, decision_type: DecisionType) -> Vec<Decision> {
        self.log
            .lock()
            .iter()
            .filter(|d| d.decision_type == decision_type)
            .cloned()
            .collect()
    }

    pub fn get_stats(&self) -> DecisionStats {
        let log = self.log.lock();
        let total = log.len();
        let rate_of = |ty: DecisionType| -> f64 {
            if total == 0 {
                0.0
            } else {
                log.iter().filter(|d| d.decision_type == ty).count() as f64 / total as f64
            }
        };
        DecisionStats {
            total,
            act_rate: rate_of(DecisionType::Act),
            ask_rate: rate_of(DecisionType::Ask),
            defer_rate: rate_of(DecisionType::Defer),
            escalate_rate: rate_of(DecisionType::Escalate),
            reject_rate: rate_of(DecisionType::Reject),
        }
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns a goal match into a decision, consulting the learning
/// collaborator for historical confidence and tracking consecutive
/// failures per goal so repeated bad outcomes escalate to a human.
pub struct DecisionEngine {
    learning: Arc<dyn LearningStore>,
    config: DecisionConfig,
    failure_counts: Mutex<HashMap<String, u32>>,
    audit: DecisionAuditLog,
}

impl DecisionEngine {
    pub fn new(learning: Arc<dyn LearningStore>) -> Self {
        Self::with_config(learning, DecisionConfig::default())
    }

    pub fn with_config(learning: Arc<dyn LearningStore>, config: DecisionConfig) -> Self {
        Self {
            learning,
            config,
            failure_counts: Mutex::new(HashMap::new()),
            audit: DecisionAuditLog::new(),
        }
    }

    pub fn audit_log(&self) -> &DecisionAuditLog {
        &self.audit
    }

    pub async fn evaluate(&self, goal: &Goal, event: &Event) -> Decision {
        let confidence = self.learning.get_confidence(goal.id.as_str(), &event.event_type).await;

        let (decision_type, reason) = if goal.requires_approval {
            (
                DecisionType::Ask,
                "Goal is configured to always require approval".to_string(),
            )
        } else if confidence.sample_count < self.config.min_samples_required {
            (
                DecisionType::Ask,
                format!(
                    "Insufficient history: {} sample(s), need at least {}",
                    confidence.sample_count, self.config.min_samples_required
                ),
            )
        } else if self.current_failures(goal.id.as_str()) >= self.config.escalate_after_failures {
            (
                DecisionType::Escalate,
                format!(
                    "Goal has failed {} consecutive times",
                    self.config.escalate_after_failures
                ),
            )
        } else {
            let threshold = goal
                .confidence_threshold
                .unwrap_or_else(|| self.config.threshold_for(goal.risk_level))
                * goal.risk_level.threshold_multiplier();
            if confidence.score >= threshold {
                (DecisionType::Act, "Confidence met threshold".to_string())
            } else if confidence.score < self.config.reject_threshold {
                (
                    DecisionType::Reject,
                    format!(
                        "Confidence {:.2} far below required {:.2}",
                        confidence.score, threshold
                    ),
                )
            } else {
                (
                    DecisionType::Ask,
                    format!("Confidence {:.2} below required {:.2}", confidence.score, threshold),
                )
            }
        };

        let decision = Decision {
            decision_id: DecisionId::new(uuid::Uuid::new_v4().to_string()),
            decision_type,
            goal: goal.clone(),
            event: event.clone(),
            confidence,
            reason,
            created_at: Utc::now(),
        };
        self.audit.record(decision.clone());
        decision
    }

    fn current_failures(&self, goal_id: &str) -> u32 {
        self.failure_counts.lock().get(goal_id).copied().unwrap_or(0)
    }

    pub fn record_outcome(&self, goal_id: &str, success: bool) {
        let mut counts = self.failure_counts.lock();
        let entry = counts.entry(goal_id.to_string()).or_insert(0);
        if success {
            *entry = 0;
        } else {
            *entry += 1;
        }
    }

    pub fn get_explanation(&self, decision: &Decision) -> String {
        format!(
            "{} decision for goal '{}': confidence {}% - {}",
            decision.decision_type.as_str().to_uppercase(),
            decision.goal.name,
            (decision.confidence.score * 100.0).round() as i64,
            decision.reason
        )
    }
}
