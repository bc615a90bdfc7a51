//! LLM-backed agent runtime.
//!
//! Each turn is a single decision: render the system prompt, ask the
//! provider, decode the reply into an [`AgentAction`]. Final replies that do
//! not tag exactly one participant are sent back to the model for repair a
//! bounded number of times.

use crate::action::decode_action;
use crate::mention;
use crate::prompt;
use async_trait::async_trait;
use huddle_config::AgentDefaults;
use huddle_core::agent::{AgentAction, AgentRuntime, AgentSpec, TurnContext};
use huddle_core::error::ExternalCallError;
use huddle_core::mcp::McpInvoker;
use huddle_core::provider::{ChatMessage, Provider, ProviderRequest};
use huddle_core::tool::{Tool, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An agent whose decisions come from an LLM provider.
pub struct LlmAgent {
    spec: AgentSpec,

    provider: Arc<dyn Provider>,

    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    /// Re-prompts allowed for a final reply with zero or several mentions
    mention_repair_attempts: u32,

    tools: ToolRegistry,

    mcp: Option<Arc<dyn McpInvoker>>,
}

impl LlmAgent {
    /// Create an agent. The model comes from its descriptor, else `"default"`.
    pub fn new(spec: AgentSpec, provider: Arc<dyn Provider>) -> Self {
        let model = spec.model.clone().unwrap_or_else(|| "default".into());
        Self {
            spec,
            provider,
            model,
            temperature: 0.7,
            max_tokens: None,
            mention_repair_attempts: 2,
            tools: ToolRegistry::new(),
            mcp: None,
        }
    }

    /// Create an agent with configured defaults for anything its descriptor leaves unset.
    pub fn from_defaults(
        spec: AgentSpec,
        provider: Arc<dyn Provider>,
        defaults: &AgentDefaults,
    ) -> Self {
        let model = spec.model.clone().unwrap_or_else(|| defaults.model.clone());
        let agent = Self::new(spec, provider)
            .with_model(model)
            .with_temperature(defaults.temperature)
            .with_mention_repair_attempts(defaults.mention_repair_attempts);
        match defaults.max_tokens {
            Some(max) => agent.with_max_tokens(max),
            None => agent,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_mention_repair_attempts(mut self, attempts: u32) -> Self {
        self.mention_repair_attempts = attempts;
        self
    }

    /// Register a tool under this agent.
    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    /// Attach MCP servers.
    pub fn with_mcp(mut self, mcp: Arc<dyn McpInvoker>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    /// One provider request, bounded by `limit` when set.
    async fn ask(
        &self,
        messages: &[ChatMessage],
        limit: Option<Duration>,
    ) -> Result<(String, AgentAction), ExternalCallError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let pending = self.provider.complete(request);
        let response = match limit {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ExternalCallError::Timeout {
                        operation: format!("LLM request for @{}", self.spec.key),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => pending.await?,
        };
        let action = decode_action(&response.content)?;
        Ok((response.content, action))
    }
}

/// Distinct participants tagged, counting every `@user` variant once.
fn distinct_mentions(text: &str) -> usize {
    let agents = mention::agent_mentions(text).len();
    agents + usize::from(mention::mentions_user(text))
}

#[async_trait]
impl AgentRuntime for LlmAgent {
    fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    async fn decide(&self, turn: &TurnContext) -> Result<AgentAction, ExternalCallError> {
        let mcp_tools = self.mcp.as_ref().map(|m| m.tools()).unwrap_or_default();
        let tool_defs = self.tools.definitions();
        let system = prompt::system_prompt(&self.spec, turn, &tool_defs, &mcp_tools);

        let mut messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(prompt::user_prompt(&turn.content)),
        ];

        let limit = turn.request_timeout;
        let (mut raw, mut action) = self.ask(&messages, limit).await?;
        debug!(agent = %self.spec.key, action = action.tag(), "Agent decided");

        let mut attempts = 0;
        while let AgentAction::Final { text } = &action {
            let count = distinct_mentions(text);
            if count == 1 || attempts >= self.mention_repair_attempts {
                break;
            }
            attempts += 1;
            warn!(
                agent = %self.spec.key,
                mentions = count,
                attempt = attempts,
                "Final reply must tag exactly one participant, asking again"
            );

            messages.push(ChatMessage::assistant(raw.clone()));
            messages.push(ChatMessage::user(prompt::repair_prompt(count)));
            match self.ask(&messages, limit).await {
                Ok((next_raw, next_action)) => {
                    raw = next_raw;
                    action = next_action;
                }
                Err(e) => {
                    warn!(
                        agent = %self.spec.key,
                        error = %e,
                        "Mention repair failed, keeping previous reply"
                    );
                    break;
                }
            }
        }

        Ok(action)
    }

    fn max_requests(&self) -> u32 {
        self.mention_repair_attempts.saturating_add(1)
    }

    fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn mcp(&self) -> Option<&dyn McpInvoker> {
        self.mcp.as_deref()
    }
}
