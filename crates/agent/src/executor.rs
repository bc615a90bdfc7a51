//! Turn execution: one agent, one action, one persisted message.
//!
//! The executor gathers the agent's context (bounded history, group roster,
//! documents addressed to it), asks the agent for a decision and carries out
//! that decision. Every failure of the agent, a tool, or an MCP server,
//! including timeouts, becomes an error message. Only an unknown agent or a
//! store failure escapes to the caller.

use crate::mention;
use huddle_config::{AppConfig, ChainConfig, TimeoutConfig};
use huddle_core::agent::{AgentAction, AgentRegistry, AgentRuntime, RosterEntry, TurnContext};
use huddle_core::error::{AgentNotFoundError, ExternalCallError, McpError, StoreError, ToolError};
use huddle_core::message::{NewMessage, Role, USER_SENDER};
use huddle_core::store::SessionStore;
use huddle_core::tool::ToolCall;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Characters of a tool or MCP result kept in the persisted message.
pub const MAX_RESULT_CHARS: usize = 2000;

/// Limits applied to each turn.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Messages of recent history handed to the agent
    pub history_window: usize,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
    pub mcp_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&ChainConfig::default(), &TimeoutConfig::default())
    }
}

impl ExecutorSettings {
    pub fn from_config(chain: &ChainConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            history_window: chain.history_window,
            llm_timeout: Duration::from_secs(timeouts.llm_secs),
            tool_timeout: Duration::from_secs(timeouts.tool_secs),
            mcp_timeout: Duration::from_secs(timeouts.mcp_secs),
        }
    }
}

/// Why a turn could not run at all.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    AgentNotFound(#[from] AgentNotFoundError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The outcome of one turn, ready to be persisted.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub agent_key: String,
    /// Tag of the action the agent chose, absent if deciding failed
    pub action: Option<&'static str>,
    /// `tool_call` record of a tool or MCP invocation, persisted before `message`
    pub call: Option<NewMessage>,
    pub message: NewMessage,
    /// The captured failure, if the turn produced an error message
    pub error: Option<ExternalCallError>,
}

impl TurnResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs single agent turns.
pub struct TurnExecutor {
    store: Arc<dyn SessionStore>,
    registry: Arc<dyn AgentRegistry>,
    settings: ExecutorSettings,
}

impl TurnExecutor {
    pub fn new(store: Arc<dyn SessionStore>, registry: Arc<dyn AgentRegistry>) -> Self {
        Self {
            store,
            registry,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        registry: Arc<dyn AgentRegistry>,
    ) -> Self {
        Self::new(store, registry)
            .with_settings(ExecutorSettings::from_config(&config.chain, &config.timeouts))
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run one turn of `agent_key` on `content` within `group_id`.
    pub async fn execute(
        &self,
        agent_key: &str,
        content: &str,
        group_id: &str,
    ) -> Result<TurnResult, TurnError> {
        let members = self.store.list_group_agents(group_id).await?;
        if !members.iter().any(|m| m == agent_key) {
            return Err(AgentNotFoundError::NotMember {
                agent_key: agent_key.to_string(),
                group_id: group_id.to_string(),
            }
            .into());
        }
        let agent = self.registry.get_agent(agent_key).await?;

        let turn = self.build_context(agent_key, content, group_id, &members).await?;
        let started = Instant::now();

        info!(
            group_id,
            agent = agent_key,
            history = turn.history.len(),
            documents = turn.documents.len(),
            "Turn started"
        );

        // Each provider request has its own deadline; this bounds the whole decision.
        let limit = self.settings.llm_timeout.saturating_mul(agent.max_requests().max(1));
        let decided = match tokio::time::timeout(limit, agent.decide(&turn)).await {
            Ok(result) => result,
            Err(_) => Err(ExternalCallError::Timeout {
                operation: format!("agent @{agent_key}"),
                timeout_ms: limit.as_millis() as u64,
            }),
        };

        let result = match decided {
            Ok(AgentAction::Final { text }) => TurnResult {
                agent_key: agent_key.to_string(),
                action: Some("final"),
                call: None,
                message: NewMessage::agent(group_id, agent_key, ensure_mention(&text))
                    .with_metadata("action", "final"),
                error: None,
            },
            Ok(AgentAction::ToolCall { tool_name, arguments }) => {
                self.run_tool(agent.as_ref(), group_id, &tool_name, arguments).await
            }
            Ok(AgentAction::McpCall { server, tool, params }) => {
                self.run_mcp(agent.as_ref(), group_id, &server, &tool, params).await
            }
            Err(e) => {
                warn!(group_id, agent = agent_key, error = %e, "Agent turn failed");
                let content = format!("[error] @{agent_key} could not respond: {e}");
                TurnResult {
                    agent_key: agent_key.to_string(),
                    action: None,
                    call: None,
                    message: NewMessage::system(group_id, content)
                        .with_metadata("agent_key", agent_key)
                        .with_metadata("error_type", e.kind()),
                    error: Some(e),
                }
            }
        };

        info!(
            group_id,
            agent = agent_key,
            role = %result.message.role,
            duration_ms = started.elapsed().as_millis() as u64,
            "Turn finished"
        );
        Ok(result)
    }

    async fn build_context(
        &self,
        agent_key: &str,
        content: &str,
        group_id: &str,
        members: &[String],
    ) -> Result<TurnContext, StoreError> {
        let history = self
            .store
            .get_history(group_id, self.settings.history_window)
            .await?;

        let roster = self
            .registry
            .specs()
            .await
            .iter()
            .filter(|spec| members.contains(&spec.key))
            .map(RosterEntry::from)
            .collect();

        let documents = self
            .store
            .list_documents(group_id)
            .await?
            .into_iter()
            .filter(|doc| doc.target_agent == agent_key)
            .collect();

        Ok(TurnContext {
            group_id: group_id.to_string(),
            agent_key: agent_key.to_string(),
            content: content.to_string(),
            history,
            roster,
            documents,
            request_timeout: Some(self.settings.llm_timeout),
        })
    }

    async fn run_tool(
        &self,
        agent: &dyn AgentRuntime,
        group_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> TurnResult {
        let agent_key = agent.spec().key.clone();
        let call = ToolCall {
            name: tool_name.to_string(),
            arguments: normalize_arguments(arguments),
        };
        debug!(group_id, agent = %agent_key, tool = tool_name, "Executing tool");
        let record = NewMessage::new(
            group_id,
            agent_key.as_str(),
            Role::ToolCall,
            format!("Tool Call: {tool_name}({})", render_params(&call.arguments)),
        )
        .with_metadata("agent_key", agent_key.as_str())
        .with_metadata("tool_name", tool_name)
        .with_metadata("params", call.arguments.clone())
        .with_metadata("status", "start");

        let started = Instant::now();
        let limit = self.settings.tool_timeout;
        let outcome = match tokio::time::timeout(limit, agent.tools().execute(&call)).await {
            Ok(Ok(result)) if result.success => Ok(result),
            Ok(Ok(result)) => Err(ToolError::ExecutionFailed {
                tool_name: tool_name.to_string(),
                reason: result.output,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ToolError::Timeout {
                tool_name: tool_name.to_string(),
                timeout_ms: limit.as_millis() as u64,
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                let rendered = match &result.data {
                    Some(data) if result.output.is_empty() => data.to_string(),
                    _ => result.output.clone(),
                };
                let content = format!(
                    "Tool result: {tool_name}\nresult: {}",
                    truncate(&rendered, MAX_RESULT_CHARS)
                );
                TurnResult {
                    agent_key: agent_key.clone(),
                    action: Some("call_tool"),
                    call: Some(record),
                    message: NewMessage::new(
                        group_id,
                        agent_key.as_str(),
                        Role::ToolResult,
                        content,
                    )
                    .with_metadata("agent_key", agent_key.as_str())
                    .with_metadata("tool", tool_name)
                    .with_metadata("params", call.arguments)
                    .with_metadata("duration_ms", duration_ms),
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    group_id,
                    agent = %agent_key,
                    tool = tool_name,
                    error = %e,
                    "Tool call failed"
                );
                let error = ExternalCallError::from(e);
                TurnResult {
                    agent_key: agent_key.clone(),
                    action: Some("call_tool"),
                    call: Some(record),
                    message: NewMessage::new(
                        group_id,
                        agent_key.as_str(),
                        Role::ToolError,
                        format!("Tool error: {tool_name}\nerror: {error}"),
                    )
                    .with_metadata("agent_key", agent_key.as_str())
                    .with_metadata("tool", tool_name)
                    .with_metadata("params", call.arguments)
                    .with_metadata("error_type", error.kind())
                    .with_metadata("duration_ms", duration_ms),
                    error: Some(error),
                }
            }
        }
    }

    async fn run_mcp(
        &self,
        agent: &dyn AgentRuntime,
        group_id: &str,
        server: &str,
        tool: &str,
        params: Value,
    ) -> TurnResult {
        let agent_key = agent.spec().key.clone();
        let params = normalize_arguments(params);
        debug!(group_id, agent = %agent_key, server, tool, "Calling MCP tool");
        let record = NewMessage::new(
            group_id,
            agent_key.as_str(),
            Role::ToolCall,
            format!("MCP Call: {server}/{tool}({})", render_params(&params)),
        )
        .with_metadata("agent_key", agent_key.as_str())
        .with_metadata("server", server)
        .with_metadata("tool_name", tool)
        .with_metadata("params", params.clone())
        .with_metadata("status", "start");

        let started = Instant::now();
        let limit = self.settings.mcp_timeout;
        let outcome = match agent.mcp() {
            None => Err(McpError::NotAttached(agent_key.clone()).into()),
            Some(mcp) => {
                let invocation = mcp.invoke(server, tool, params.clone());
                match tokio::time::timeout(limit, invocation).await {
                    Ok(result) => result.map_err(ExternalCallError::from),
                    Err(_) => Err(ExternalCallError::Timeout {
                        operation: format!("MCP {server}/{tool}"),
                        timeout_ms: limit.as_millis() as u64,
                    }),
                }
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let base = |role: Role, content: String| {
            NewMessage::new(group_id, agent_key.as_str(), role, content)
                .with_metadata("agent_key", agent_key.as_str())
                .with_metadata("server", server)
                .with_metadata("tool", tool)
                .with_metadata("params", params.clone())
                .with_metadata("duration_ms", duration_ms)
        };

        match outcome {
            Ok(value) => {
                let rendered = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let content = format!(
                    "MCP result: {server}/{tool}\nresult: {}",
                    truncate(&rendered, MAX_RESULT_CHARS)
                );
                TurnResult {
                    agent_key: agent_key.clone(),
                    action: Some("call_mcp"),
                    call: Some(record),
                    message: base(Role::ToolResult, content),
                    error: None,
                }
            }
            Err(error) => {
                warn!(
                    group_id,
                    agent = %agent_key,
                    server,
                    tool,
                    error = %error,
                    "MCP call failed"
                );
                let content = format!("MCP error: {server}/{tool}\nerror: {error}");
                TurnResult {
                    agent_key: agent_key.clone(),
                    action: Some("call_mcp"),
                    call: Some(record),
                    message: base(Role::ToolError, content)
                        .with_metadata("error_type", error.kind()),
                    error: Some(error),
                }
            }
        }
    }
}

/// Guarantee a final reply addresses someone: append `@user` if it mentions nobody.
pub fn ensure_mention(text: &str) -> String {
    if !mention::mentions(text).is_empty() {
        return text.to_string();
    }
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        format!("@{USER_SENDER}")
    } else {
        format!("{trimmed} @{USER_SENDER}")
    }
}

/// `key=value` pairs for a call record; strings are shown unquoted.
fn render_params(params: &Value) -> String {
    match params {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Null arguments mean "no arguments".
fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}

/// Clip to `max_chars` characters.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
