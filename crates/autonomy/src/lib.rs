// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-autonomy: the event-driven side of the agent that runs without a
//! turn in flight. The [`bus`] module delivers external events by
//! priority with dedup and a dead letter queue; [`decision`] turns a
//! goal/event match plus historical confidence into an ACT/ASK/DEFER/
//! ESCALATE/REJECT call; [`goal`] holds the trigger definitions those
//! decisions are made against.

pub mod bus;
pub mod decision;
pub mod goal;

pub use bus::{create_event, BusMetrics, DlqEntry, Event, EventBus, EventHandler, EventPriority};
pub use decision::{
    ConfidenceScore, Decision, DecisionAuditLog, DecisionConfig, DecisionEngine, DecisionStats,
    DecisionType, LearningStore,
};
pub use goal::{Action, ActionType, Goal, GoalManager, GoalManagerStatus, Limits, RiskLevel, Trigger};
