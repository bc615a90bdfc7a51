//! Error types for the huddle domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the chain engine only lets
//! [`RoutingError`] escape to callers; everything else is captured as
//! conversation history.

use thiserror::Error;

/// The top-level error type for all huddle operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Routing errors ---
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Agent lookup ---
    #[error("Agent error: {0}")]
    AgentNotFound(#[from] AgentNotFoundError),

    // --- External call errors ---
    #[error("External call error: {0}")]
    External(#[from] ExternalCallError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("No MCP servers attached to agent '{0}'")]
    NotAttached(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP tool not found: {server}/{tool}")]
    ToolNotFound { server: String, tool: String },

    #[error("MCP call failed: {server}/{tool}: {reason}")]
    CallFailed {
        server: String,
        tool: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    #[error("Unsupported document type: {0}")]
    Unsupported(String),

    #[error("Text extraction failed for {filename}: {reason}")]
    ExtractionFailed { filename: String, reason: String },
}

/// The addressed agent cannot take the turn.
///
/// Never shown to the end user: a stray `@typo` silently ends the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentNotFoundError {
    #[error("Unknown agent '@{0}'")]
    Unknown(String),

    #[error("Agent '@{agent_key}' is not a member of group {group_id}")]
    NotMember { agent_key: String, group_id: String },
}

/// A failure while an agent was reasoning or acting.
///
/// Captured by the turn executor and persisted as an error-role message.
#[derive(Debug, Clone, Error)]
pub enum ExternalCallError {
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("{0}")]
    Mcp(#[from] McpError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Unknown agent action '{0}'")]
    UnknownAction(String),

    #[error("Malformed agent action: {0}")]
    MalformedAction(String),
}

impl ExternalCallError {
    /// Short machine-readable tag stored as `error_type` in message metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Tool(ToolError::NotFound(_)) => "unknown_tool",
            Self::Tool(_) => "tool",
            Self::Mcp(_) => "mcp",
            Self::Timeout { .. } => "timeout",
            Self::UnknownAction(_) => "unknown_action",
            Self::MalformedAction(_) => "malformed_action",
        }
    }
}

/// Fatal chain failure: nothing durable could be recorded.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Failed to persist chain state: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Document upload failed: {0}")]
    Document(#[from] DocumentError),
}
