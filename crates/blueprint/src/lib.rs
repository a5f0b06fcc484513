// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ag3nt-blueprint: persistent planning state. [`blueprint`] holds the
//! PRP-style structured blueprint (goal/why/what, tasks with validation
//! gates, context) used when context engineering is enabled; [`todo`]
//! is the lighter flat task list used otherwise. Both persist to JSON
//! under a user-scoped data directory rather than staying in memory.

pub mod blueprint;
pub mod todo;

pub use blueprint::{
    AntiPattern, BlueprintError, BlueprintManager, BlueprintStatus, BlueprintStore, BlueprintTask,
    CodeReference, ContextBlueprint, SuccessCriterion, TaskComplexity, TaskStatus as BlueprintTaskStatus,
    ValidationGate, ValidationLevel, ValidationType,
};
pub use todo::{Priority, Task, TaskFilter, TaskStatus, TodoError, TodoStore};
