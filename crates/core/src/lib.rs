//! # huddle core
//!
//! Domain types, collaborator traits, and error definitions for the huddle
//! multi-agent group chat engine. This crate has **no framework code**; it
//! defines the model the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the routing engine is a trait here: the session
//! store, the event emitter, the LLM provider, tools, MCP servers, document
//! extraction and the agent registry. Implementations live elsewhere, so the
//! engine can be driven by scripted doubles in tests.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod mcp;
pub mod document;
pub mod agent;
pub mod store;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{
    AgentNotFoundError, Error, ExternalCallError, Result, RoutingError, StoreError,
};
pub use message::{Group, Message, Metadata, NewMessage, Role, SYSTEM_SENDER, USER_SENDER};
pub use provider::{ChatMessage, Provider, ProviderRequest, ProviderResponse};
pub use tool::{Tool, ToolCall, ToolResult, ToolRegistry};
pub use mcp::{McpInvoker, McpToolInfo};
pub use document::{DocumentExtractor, DocumentRef, ExtractedDocument};
pub use agent::{AgentAction, AgentRegistry, AgentRuntime, AgentSpec, RosterEntry, TurnContext};
pub use store::SessionStore;
pub use event::{ChatEvent, EventBus, EventEmitter};
