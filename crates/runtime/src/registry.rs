// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed tool registration. Per the turn-scheduling design note, the
//! registry is built once per turn from the active policy profile and a
//! user config directory, then never mutated while the turn is in flight.

use crate::tool::{Tool, ToolDefinition};
use ag3nt_policy::ToolPolicy;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Tool definitions for every registered name the policy allows,
    /// suitable for handing straight to the model. Names the policy
    /// denies are simply absent, matching spec.md §7's "silently
    /// filtered" propagation rule.
    pub fn resolve_for_policy(&self, policy: &ToolPolicy) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|tool| policy.is_tool_allowed(tool.name()))
            .map(|tool| tool.definition())
            .collect()
    }
}
