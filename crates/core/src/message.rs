//! Group and Message domain types.
//!
//! A group is a conversation container; its messages form a strictly
//! append-only history ordered by sequence id:
//! user posts → chain controller routes → agent replies → controller persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sender id used for human input, and the `@user` mention sentinel.
pub const USER_SENDER: &str = "user";

/// Sender id used for controller-authored notices.
pub const SYSTEM_SENDER: &str = "system";

/// Metadata type tag for document-upload notices.
pub const DOCUMENT_UPLOAD: &str = "document_upload";

/// Free-form message metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A conversation container with its member agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Member agent keys, sorted.
    #[serde(default)]
    pub members: Vec<String>,
}

/// How a message's content should be interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Human input
    User,
    /// An agent's final reply
    Agent,
    /// Controller notices, agent failures and document uploads
    System,
    /// A tool invocation request
    ToolCall,
    /// A successful tool or MCP result
    ToolResult,
    /// A failed tool or MCP invocation
    ToolError,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::System => "system",
            Role::ToolCall => "tool_call",
            Role::ToolResult => "tool_result",
            Role::ToolError => "tool_error",
        }
    }

    /// Whether messages with this role may be scanned for mentions.
    ///
    /// Error and notice roles never advance a chain, even when their text
    /// happens to contain an `@token`.
    pub fn is_routable(&self) -> bool {
        matches!(self, Role::User | Role::Agent | Role::ToolResult)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "agent" => Ok(Role::Agent),
            "system" => Ok(Role::System),
            "tool_call" => Ok(Role::ToolCall),
            "tool_result" => Ok(Role::ToolResult),
            "tool_error" => Ok(Role::ToolError),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

/// A persisted entry in a group's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic sequence id assigned by the store
    pub id: i64,

    pub group_id: String,

    /// User id, agent key, or `"system"`
    pub sender: String,

    pub role: Role,

    pub content: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,

    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The agent key recorded in metadata, falling back to the sender.
    pub fn agent_key(&self) -> &str {
        self.metadata
            .get("agent_key")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.sender)
    }

    /// Whether this message is a document-upload notice.
    pub fn is_document_upload(&self) -> bool {
        self.metadata.get("message_type").and_then(|v| v.as_str()) == Some(DOCUMENT_UPLOAD)
    }
}

/// A message waiting to be appended; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub group_id: String,
    pub sender: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewMessage {
    pub fn new(
        group_id: impl Into<String>,
        sender: impl Into<String>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            sender: sender.into(),
            role,
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Human input from the default user.
    pub fn user(group_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(group_id, USER_SENDER, Role::User, content)
    }

    /// A final agent reply, tagged with its `agent_key`.
    pub fn agent(
        group_id: impl Into<String>,
        agent_key: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let key = agent_key.into();
        Self::new(group_id, key.clone(), Role::Agent, content).with_metadata("agent_key", key)
    }

    /// A controller notice.
    pub fn system(group_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(group_id, SYSTEM_SENDER, Role::System, content)
    }

    /// Attach one metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Materialize into a stored message.
    pub fn into_message(self, id: i64, created_at: DateTime<Utc>) -> Message {
        Message {
            id,
            group_id: self.group_id,
            sender: self.sender,
            role: self.role,
            content: self.content,
            metadata: self.metadata,
            created_at,
        }
    }
}
