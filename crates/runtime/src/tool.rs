// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A tool is `name + input-schema + invoke(args) -> result`. Tool bodies
//! themselves (web search, notebook editing, ...) are external
//! collaborators; this module only defines the contract the turn
//! controller dispatches through.

use async_trait::async_trait;
use serde_json::Value;

/// Names a tool's argument path fields, checked against workspace
/// boundaries before invocation. Matches spec's fixed field-name list.
pub const PATH_ARG_KEYS: &[&str] = &["file_path", "path", "target"];

#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub content: Option<Value>,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<Value>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }
}

/// One entry in the tool definitions offered to the model for a turn.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn invoke(&self, args: Value) -> ToolOutcome;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Extracts a path-shaped argument from a tool call's arguments, checking
/// each of [`PATH_ARG_KEYS`] in order.
pub fn extract_path_arg(args: &Value) -> Option<&str> {
    PATH_ARG_KEYS.iter().find_map(|key| args.get(key)).and_then(Value::as_str)
}
