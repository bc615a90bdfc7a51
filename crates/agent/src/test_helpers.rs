//! Shared test doubles for agent, executor and chain tests.

use async_trait::async_trait;
use huddle_core::agent::{AgentAction, AgentRuntime, AgentSpec, TurnContext};
use huddle_core::document::DocumentRef;
use huddle_core::error::{ExternalCallError, McpError, ProviderError, StoreError, ToolError};
use huddle_core::mcp::{McpInvoker, McpToolInfo};
use huddle_core::message::{Group, Message, NewMessage};
use huddle_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use huddle_core::store::SessionStore;
use huddle_core::tool::{Tool, ToolRegistry, ToolResult};
use huddle_store::InMemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_count: AtomicUsize,
    delays: Vec<Duration>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            delays: Vec::new(),
        }
    }

    /// Sleep before answering: `delays[n]` for call `n`, the last entry after that.
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Create a provider that answers with each text in turn.
    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(count).or(self.delays.last()) {
            tokio::time::sleep(*delay).await;
        }
        let responses = self.responses.lock().unwrap();

        if count >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                count,
                responses.len()
            );
        }

        responses[count].clone()
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        model: "mock-model".into(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
    }
}

type DecideFn = dyn Fn(&TurnContext) -> Result<AgentAction, ExternalCallError> + Send + Sync;

/// An agent whose decisions come from a closure, with a call counter.
pub struct ScriptedAgent {
    spec: AgentSpec,
    decide: Box<DecideFn>,
    calls: AtomicUsize,
    seen: Mutex<Vec<TurnContext>>,
    tools: ToolRegistry,
    mcp: Option<Arc<dyn McpInvoker>>,
    delay: Option<Duration>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedAgent {
    pub fn new(
        key: &str,
        decide: impl Fn(&TurnContext) -> Result<AgentAction, ExternalCallError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            spec: AgentSpec::new(key, key.to_uppercase()),
            decide: Box::new(decide),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            tools: ToolRegistry::new(),
            mcp: None,
            delay: None,
            gate: None,
        }
    }

    /// An agent that always replies with the same final text.
    pub fn replying(key: &str, text: &str) -> Self {
        let text = text.to_string();
        Self::new(key, move |_| Ok(AgentAction::Final { text: text.clone() }))
    }

    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_mcp(mut self, mcp: Arc<dyn McpInvoker>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    /// Sleep before deciding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Signal `entered` when a turn starts, then wait for `release`.
    pub fn with_gate(mut self, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gate = Some((entered, release));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Turn contexts received so far.
    pub fn seen(&self) -> Vec<TurnContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgent {
    fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    async fn decide(&self, turn: &TurnContext) -> Result<AgentAction, ExternalCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(turn.clone());
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.decide)(turn)
    }

    fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn mcp(&self) -> Option<&dyn McpInvoker> {
        self.mcp.as_deref()
    }
}

/// A simple tool that echoes its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes back the input"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"].as_str().unwrap_or("").to_string();
        Ok(ToolResult::ok(text))
    }
}

/// A tool that always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "explode"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "explode".into(),
            reason: "boom".into(),
        })
    }
}

/// A tool that never finishes in time.
pub struct SlowTool(pub Duration);

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }
    fn description(&self) -> &str {
        "Sleeps before answering"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(self.0).await;
        Ok(ToolResult::ok("late"))
    }
}

/// One MCP server with a fixed tool list and a fixed answer.
pub struct MockMcp {
    pub server: String,
    pub tools: Vec<McpToolInfo>,
    pub answer: Result<serde_json::Value, McpError>,
    pub delay: Duration,
}

impl MockMcp {
    pub fn answering(server: &str, tool: &str, answer: serde_json::Value) -> Self {
        Self {
            server: server.into(),
            tools: vec![McpToolInfo {
                server: server.into(),
                name: tool.into(),
                description: format!("{tool} on {server}"),
                input_schema: serde_json::json!({}),
            }],
            answer: Ok(answer),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl McpInvoker for MockMcp {
    fn servers(&self) -> Vec<String> {
        vec![self.server.clone()]
    }

    fn tools(&self) -> Vec<McpToolInfo> {
        self.tools.clone()
    }

    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        _params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        if server != self.server {
            return Err(McpError::ServerNotFound(server.into()));
        }
        if !self.tools.iter().any(|t| t.name == tool) {
            return Err(McpError::ToolNotFound {
                server: server.into(),
                tool: tool.into(),
            });
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone()
    }
}

/// In-memory store whose `append_message` starts failing after `ok_appends` writes.
pub struct FailingStore {
    inner: InMemoryStore,
    ok_appends: usize,
    appends: AtomicUsize,
}

impl FailingStore {
    pub fn failing_after(ok_appends: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            ok_appends,
            appends: AtomicUsize::new(0),
        }
    }

    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn create_group(&self, name: &str) -> Result<Group, StoreError> {
        self.inner.create_group(name).await
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, StoreError> {
        self.inner.get_group(group_id).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        self.inner.list_groups().await
    }

    async fn rename_group(&self, group_id: &str, name: &str) -> Result<(), StoreError> {
        self.inner.rename_group(group_id, name).await
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_group(group_id).await
    }

    async fn add_agent_to_group(&self, group_id: &str, agent_key: &str) -> Result<(), StoreError> {
        self.inner.add_agent_to_group(group_id, agent_key).await
    }

    async fn remove_agent_from_group(
        &self,
        group_id: &str,
        agent_key: &str,
    ) -> Result<(), StoreError> {
        self.inner.remove_agent_from_group(group_id, agent_key).await
    }

    async fn list_group_agents(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_group_agents(group_id).await
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let attempt = self.appends.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.ok_appends {
            return Err(StoreError::Storage("disk full".into()));
        }
        self.inner.append_message(message).await
    }

    async fn get_history(&self, group_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        self.inner.get_history(group_id, limit).await
    }

    async fn list_documents(&self, group_id: &str) -> Result<Vec<DocumentRef>, StoreError> {
        self.inner.list_documents(group_id).await
    }
}
