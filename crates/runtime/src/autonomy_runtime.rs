// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the event bus, decision engine, and goal manager together
//! without letting any of the three call another directly.
//!
//! The three collaborators form a conceptual cycle: the bus delivers
//! events to the engine, the engine schedules actions, and those actions
//! are themselves new events. Breaking the cycle means the bus only ever
//! calls a subscriber's `handle`, and a subscriber only ever talks back
//! to the bus through `publish`. [`GoalEvaluator`] is the engine-owned
//! subscriber that turns a matching event into a decision and republishes
//! it as a `goal.action.scheduled`/`goal.action.pending_approval`/
//! `goal.action.rejected` event; [`ActionDispatcher`] is a second,
//! independent subscriber that only reacts to `goal.action.scheduled` and
//! actually runs the action.

use ag3nt_autonomy::bus::{Event, EventBus, EventHandler, EventPriority};
use ag3nt_autonomy::decision::{Decision, DecisionEngine, DecisionType};
use ag3nt_autonomy::goal::{Action, ActionType, Goal, GoalManager};
use ag3nt_shell::ExecApprovalEvaluator;
use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

const GOAL_ACTION_SCHEDULED: &str = "goal.action.scheduled";
const GOAL_ACTION_PENDING_APPROVAL: &str = "goal.action.pending_approval";
const GOAL_ACTION_REJECTED: &str = "goal.action.rejected";
const ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Delivers an autonomous notify action to its destination channel. The
/// channel transport (chat client, webhook, ...) lives outside this crate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, message: &str) -> anyhow::Result<()>;
}

/// The engine-owned bus subscriber. Never executes an action itself; it
/// only decides and republishes.
pub struct GoalEvaluator {
    goals: Arc<GoalManager>,
    engine: Arc<DecisionEngine>,
    bus: Arc<EventBus>,
}

impl GoalEvaluator {
    pub fn new(goals: Arc<GoalManager>, engine: Arc<DecisionEngine>, bus: Arc<EventBus>) -> Self {
        Self { goals, engine, bus }
    }

    async fn publish_outcome(&self, event_type: &str, decision: &Decision) {
        let event = Event::new(event_type, "goal-evaluator")
            .with_priority(priority_for(decision.goal.risk_level))
            .with_payload(json!({
                "goal_id": decision.goal.id.as_str(),
                "decision_id": decision.decision_id.as_str(),
                "decision_type": decision.decision_type.as_str(),
                "reason": decision.reason,
                "action": rendered_action_payload(&decision.goal.action.render(&decision.event)),
                "source_event": {
                    "event_id": decision.event.event_id.as_str(),
                    "event_type": decision.event.event_type,
                },
            }));
        self.bus.publish(event).await;
    }
}

fn priority_for(risk: ag3nt_autonomy::goal::RiskLevel) -> EventPriority {
    use ag3nt_autonomy::goal::RiskLevel;
    match risk {
        RiskLevel::Low => EventPriority::Low,
        RiskLevel::Medium => EventPriority::Medium,
        RiskLevel::High => EventPriority::High,
        RiskLevel::Critical => EventPriority::Critical,
    }
}

fn rendered_action_payload(action: &Action) -> serde_json::Value {
    json!({
        "type": action.action_type,
        "command": action.command,
        "channel": action.channel,
        "message": action.message,
        "timeout_seconds": action.timeout_seconds,
    })
}

#[async_trait]
impl EventHandler for GoalEvaluator {
    async fn handle(&self, event: &Event) -> Result<(), String> {
        let matching = self.goals.find_matching_goals(event);
        for goal in matching {
            let decision = self.engine.evaluate(&goal, event).await;
            let outcome_type = match decision.decision_type {
                DecisionType::Act => GOAL_ACTION_SCHEDULED,
                DecisionType::Ask => GOAL_ACTION_PENDING_APPROVAL,
                DecisionType::Defer => continue,
                DecisionType::Escalate => GOAL_ACTION_PENDING_APPROVAL,
                DecisionType::Reject => GOAL_ACTION_REJECTED,
            };
            self.publish_outcome(outcome_type, &decision).await;
        }
        Ok(())
    }
}

/// The second subscriber: reacts only to `goal.action.scheduled` events
/// and actually runs the rendered action, then feeds the outcome back
/// into the goal's rate limiting and the engine's failure streak.
pub struct ActionDispatcher {
    goals: Arc<GoalManager>,
    engine: Arc<DecisionEngine>,
    shell_policy: Arc<ExecApprovalEvaluator>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ActionDispatcher {
    pub fn new(goals: Arc<GoalManager>, engine: Arc<DecisionEngine>, shell_policy: Arc<ExecApprovalEvaluator>) -> Self {
        Self {
            goals,
            engine,
            shell_policy,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    async fn run_shell(&self, command: &str) -> Result<(), String> {
        let approval = self.shell_policy.evaluate(command);
        if approval.decision != ag3nt_shell::Decision::Allow {
            return Err(format!("shell action not auto-approved: {}", approval.reason));
        }

        let mut child = Command::new("sh");
        child
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(ACTION_TIMEOUT, child.output())
            .await
            .map_err(|_| format!("shell action timed out after {ACTION_TIMEOUT:?}"))?
            .map_err(|err| format!("failed to spawn shell action: {err}"))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).into_owned());
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ActionDispatcher {
    async fn handle(&self, event: &Event) -> Result<(), String> {
        let goal_id = event
            .payload
            .get("goal_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "goal.action.scheduled event missing goal_id".to_string())?;
        let action = event
            .payload
            .get("action")
            .cloned()
            .ok_or_else(|| "goal.action.scheduled event missing action".to_string())?;
        let action: Action = serde_json::from_value(action).map_err(|err| err.to_string())?;

        let result = match action.action_type {
            Some(ActionType::Shell) => {
                let command = action.command.as_deref().unwrap_or_default();
                self.run_shell(command).await
            }
            Some(ActionType::Notify) => match &self.notifier {
                Some(notifier) => notifier
                    .notify(action.channel.as_deref().unwrap_or_default(), action.message.as_deref().unwrap_or_default())
                    .await
                    .map_err(|err| err.to_string()),
                None => Err("no notifier configured".to_string()),
            },
            None => Err("action has no type".to_string()),
        };

        self.goals.record_execution(goal_id);
        self.engine.record_outcome(goal_id, result.is_ok());

        match &result {
            Ok(()) => info!(goal_id, "autonomous action completed"),
            Err(err) => warn!(goal_id, %err, "autonomous action failed"),
        }
        result
    }
}

/// Subscribes both halves onto `bus`. Call once at startup, after the bus
/// is constructed and before [`EventBus::start`].
pub fn install(
    bus: &Arc<EventBus>,
    goals: Arc<GoalManager>,
    engine: Arc<DecisionEngine>,
    shell_policy: Arc<ExecApprovalEvaluator>,
    notifier: Option<Arc<dyn Notifier>>,
) {
    let evaluator = Arc::new(GoalEvaluator::new(Arc::clone(&goals), Arc::clone(&engine), Arc::clone(bus)));
    bus.subscribe(evaluator, None);

    let mut dispatcher = ActionDispatcher::new(goals, engine, shell_policy);
    if let Some(notifier) = notifier {
        dispatcher = dispatcher.with_notifier(notifier);
    }
    let mut scheduled = std::collections::HashSet::new();
    scheduled.insert(GOAL_ACTION_SCHEDULED.to_string());
    bus.subscribe(Arc::new(dispatcher), Some(scheduled));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag3nt_autonomy::bus::EventPriority as Priority;
    use ag3nt_autonomy::decision::ConfidenceScore;
    use ag3nt_autonomy::decision::LearningStore;
    use ag3nt_autonomy::goal::{RiskLevel, Trigger};
    use ag3nt_shell::{AskMode, ExecPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn permissive_exec_policy() -> ExecPolicy {
        ExecPolicy {
            ask_mode: AskMode::Never,
            ..ExecPolicy::default()
        }
    }

    struct AlwaysConfident;

    #[async_trait]
    impl LearningStore for AlwaysConfident {
        async fn get_confidence(&self, _goal_id: &str, _event_type: &str) -> ConfidenceScore {
            ConfidenceScore::new(0.99, 50, 0.99, 10)
        }
    }

    fn permissive_shell_policy() -> Arc<ExecApprovalEvaluator> {
        Arc::new(ExecApprovalEvaluator::new(permissive_exec_policy()))
    }

    #[tokio::test]
    async fn act_decision_is_rendered_dispatched_and_rate_limited() {
        let goals = Arc::new(GoalManager::new());
        goals.add_goal(
            Goal::new(
                "echo-goal",
                "Echo goal",
                "runs echo",
                Trigger::new("disk.low"),
                Action::shell("echo {{ event['payload']['host'] }}"),
            )
            .with_risk_level(RiskLevel::Low),
        );

        let engine = Arc::new(DecisionEngine::new(Arc::new(AlwaysConfident)));
        let bus = Arc::new(EventBus::new(0, StdDuration::from_millis(1)));
        install(&bus, Arc::clone(&goals), Arc::clone(&engine), permissive_shell_policy(), None);

        bus.start().await;
        bus.publish(Event::new("disk.low", "monitor").with_payload(json!({"host": "db-1"})).with_priority(Priority::High))
            .await;
        tokio::time::sleep(StdDuration::from_millis(150)).await;
        bus.stop().await;

        let goal = goals.get_goal("echo-goal").unwrap();
        assert!(!goal.can_execute().0, "cooldown should be active after a completed run");
    }

    #[tokio::test]
    async fn goal_requiring_approval_never_reaches_the_dispatcher() {
        let goals = Arc::new(GoalManager::new());
        goals.add_goal(
            Goal::new(
                "approval-goal",
                "Approval goal",
                "always asks",
                Trigger::new("deploy.requested"),
                Action::shell("echo should-not-run"),
            )
            .with_requires_approval(true),
        );

        let engine = Arc::new(DecisionEngine::new(Arc::new(AlwaysConfident)));
        let bus = Arc::new(EventBus::new(0, StdDuration::from_millis(1)));

        let counter = Arc::new(AtomicUsize::new(0));
        struct CountingHandler(Arc<AtomicUsize>);
        #[async_trait]
        impl EventHandler for CountingHandler {
            async fn handle(&self, event: &Event) -> Result<(), String> {
                if event.event_type == GOAL_ACTION_PENDING_APPROVAL {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        }
        bus.subscribe(Arc::new(CountingHandler(Arc::clone(&counter))), None);
        install(&bus, Arc::clone(&goals), engine, permissive_shell_policy(), None);

        bus.start().await;
        bus.publish(Event::new("deploy.requested", "ci")).await;
        tokio::time::sleep(StdDuration::from_millis(150)).await;
        bus.stop().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let goal = goals.get_goal("approval-goal").unwrap();
        assert!(goal.can_execute().0, "a pending-approval decision must not consume the cooldown");
    }
}
