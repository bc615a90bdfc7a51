//! Agent descriptors, agent actions and the runtime/registry traits.
//!
//! An agent is addressed by its `key` (`@key` in message text). For each
//! turn the agent's runtime decides on exactly one [`AgentAction`]; the turn
//! executor carries it out.

use crate::document::DocumentRef;
use crate::error::{AgentNotFoundError, ExternalCallError};
use crate::mcp::McpInvoker;
use crate::message::Message;
use crate::tool::ToolRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Static descriptor of an agent, loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Unique, mention-addressable identifier
    pub key: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub emoji: String,

    /// LLM provider override (falls back to the configured default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// LLM model override (falls back to the configured default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Names of the tools registered for this agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    /// MCP servers this agent may call
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, McpServerSpec>,
}

impl AgentSpec {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: String::new(),
            emoji: String::new(),
            provider: None,
            model: None,
            tools: Vec::new(),
            mcp_servers: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// How to reach one MCP server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerSpec {
    /// Executable for stdio transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Endpoint for HTTP transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One group member as shown to another agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub key: String,
    pub name: String,
    pub description: String,
    pub emoji: String,
}

impl From<&AgentSpec> for RosterEntry {
    fn from(spec: &AgentSpec) -> Self {
        Self {
            key: spec.key.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            emoji: spec.emoji.clone(),
        }
    }
}

/// The single action an agent chooses for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum AgentAction {
    /// Plain text reply; should end by addressing `@user` or another agent.
    #[serde(rename = "final")]
    Final {
        #[serde(default)]
        text: String,
    },

    /// Call one of the agent's registered tools.
    #[serde(rename = "call_tool")]
    ToolCall {
        #[serde(alias = "tool")]
        tool_name: String,
        #[serde(default = "empty_object", alias = "kwargs", alias = "inputs")]
        arguments: serde_json::Value,
    },

    /// Call a tool on an external MCP server.
    #[serde(rename = "call_mcp")]
    McpCall {
        server: String,
        tool: String,
        #[serde(default = "empty_object", alias = "inputs")]
        params: serde_json::Value,
    },
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl AgentAction {
    /// The wire tag of this action.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Final { .. } => "final",
            Self::ToolCall { .. } => "call_tool",
            Self::McpCall { .. } => "call_mcp",
        }
    }

    /// All tags an agent may emit.
    pub const TAGS: [&'static str; 3] = ["final", "call_tool", "call_mcp"];
}

/// Everything an agent gets to see for one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub group_id: String,
    pub agent_key: String,
    /// Message content with the agent's own mention stripped
    pub content: String,
    /// Bounded window of recent group history, oldest first
    pub history: Vec<Message>,
    /// Current group members
    pub roster: Vec<RosterEntry>,
    /// Uploaded documents addressed to this agent
    pub documents: Vec<DocumentRef>,
    /// Deadline for each provider request made while deciding
    pub request_timeout: Option<Duration>,
}

/// A live agent able to take turns.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    fn spec(&self) -> &AgentSpec;

    /// Decide on one action for the turn.
    async fn decide(&self, turn: &TurnContext) -> Result<AgentAction, ExternalCallError>;

    /// Most provider requests one `decide` call may make.
    fn max_requests(&self) -> u32 {
        1
    }

    /// Tools registered for this agent.
    fn tools(&self) -> &ToolRegistry;

    /// Attached MCP servers, if any.
    fn mcp(&self) -> Option<&dyn McpInvoker> {
        None
    }
}

/// Resolves agent keys to runtimes.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn get_agent(
        &self,
        agent_key: &str,
    ) -> std::result::Result<std::sync::Arc<dyn AgentRuntime>, AgentNotFoundError>;

    /// Descriptors of every known agent.
    async fn specs(&self) -> Vec<AgentSpec>;
}
