//! MCP invoker trait: external tool servers an agent can delegate to.
//!
//! Connection management and the wire protocol live outside huddle; the
//! engine only needs to list cached tools and call one.

use crate::error::McpError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool exposed by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolInfo {
    pub server: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the tool input (`properties`, `required`)
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

impl McpToolInfo {
    /// Parameter names, required ones suffixed with `*`.
    pub fn parameter_summary(&self) -> Vec<String> {
        let required: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        self.input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .keys()
                    .map(|name| {
                        if required.contains(&name.as_str()) {
                            format!("{name}*")
                        } else {
                            name.clone()
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A handle onto the MCP servers attached to one agent.
#[async_trait]
pub trait McpInvoker: Send + Sync {
    /// Names of the attached servers.
    fn servers(&self) -> Vec<String>;

    /// Cached tool listings across all attached servers.
    fn tools(&self) -> Vec<McpToolInfo>;

    /// Call `tool` on `server` with JSON parameters.
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, McpError>;
}
