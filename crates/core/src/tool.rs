//! Agent-local tools.
//!
//! Each agent owns a [`ToolRegistry`]. A `call_tool` action can only reach
//! tools in the calling agent's own registry; any other name fails with
//! [`ToolError::NotFound`].

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One invocation requested by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Keyword arguments, normally a JSON object
    pub arguments: Value,
}

/// What a tool handed back.
///
/// `success == false` is reported to the group as a tool error carrying
/// `output` as the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    /// Structured payload, preferred over `output` when rendering the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }
}

/// Name, purpose and argument schema, as listed in an agent's prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key; also the `tool_name` agents use to call it.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the keyword arguments.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().into(),
            description: self.description().into(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tools keyed by name. Ordered so prompt listings are stable.
#[derive(Default)]
pub struct ToolRegistry {
    by_name: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later tool with the same name shadows the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.by_name.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.by_name.get(name).map(Box::as_ref)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.by_name.values().map(|tool| tool.to_definition()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        match self.get(&call.name) {
            Some(tool) => tool.execute(call.arguments.clone()).await,
            None => Err(ToolError::NotFound(call.name.clone())),
        }
    }
}
