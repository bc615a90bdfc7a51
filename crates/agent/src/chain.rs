//! Chain controller: the mention-routing loop.
//!
//! One inbound message starts a chain. The controller persists it, then
//! repeatedly parses the latest persisted message, runs the single addressed
//! agent and persists the result, until nobody (or `@user`) is addressed,
//! the group is stopped, or the iteration guard trips.
//!
//! ```text
//! inbound ─► persist ─► parse ─┬─► halt
//!                  ▲           └─► execute ─► persist ─┐
//!                  └──────────────────────────────────┘
//! ```

use crate::executor::{TurnError, TurnExecutor, truncate};
use crate::mention::{self, ParsedMention};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use huddle_config::AppConfig;
use huddle_core::agent::AgentRegistry;
use huddle_core::document::{DocumentExtractor, ExtractedDocument};
use huddle_core::error::{AgentNotFoundError, DocumentError, RoutingError};
use huddle_core::event::{ChatEvent, EventEmitter};
use huddle_core::message::{DOCUMENT_UPLOAD, Message, NewMessage, Role, USER_SENDER};
use huddle_core::store::SessionStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why a chain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Auto-routing is switched off for the group
    Stopped,
    /// The latest message has a role that never advances a chain
    NotRoutable,
    /// Several distinct agents were addressed
    Ambiguous,
    /// Only `@user` was addressed
    UserAddressed,
    /// Nobody was addressed
    NoMention,
    /// The addressed agent is not in the group
    NonMember,
    /// An agent addressed itself
    SelfMention,
    /// The addressed member has no runtime
    UnknownAgent,
    /// The iteration guard tripped
    IterationLimit,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::NotRoutable => "not_routable",
            Self::Ambiguous => "ambiguous",
            Self::UserAddressed => "user_addressed",
            Self::NoMention => "no_mention",
            Self::NonMember => "non_member",
            Self::SelfMention => "self_mention",
            Self::UnknownAgent => "unknown_agent",
            Self::IterationLimit => "iteration_limit",
        }
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loop limits and behaviour switches.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    /// Agent turns allowed per chain
    pub max_iterations: usize,
    /// Route an unaddressed user message to the group's only member
    pub single_agent_autoroute: bool,
    /// Characters of extracted document text kept in upload metadata
    pub document_excerpt_chars: usize,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            single_agent_autoroute: true,
            document_excerpt_chars: 2000,
        }
    }
}

impl From<&huddle_config::ChainConfig> for ChainSettings {
    fn from(config: &huddle_config::ChainConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            single_agent_autoroute: config.single_agent_autoroute,
            document_excerpt_chars: config.document_excerpt_chars,
        }
    }
}

/// What one `route_message` call did.
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutcome {
    pub halt_reason: HaltReason,
    /// Agent turns executed
    pub turns: usize,
    /// Agent keys addressed, in order
    pub visited: Vec<String>,
    /// Id of the persisted inbound message
    pub inbound_id: i64,
    /// Ids of every message persisted by this chain, inbound first
    pub message_ids: Vec<i64>,
    /// Agent the last message addressed but which never ran
    pub addressed: Option<String>,
}

/// Drives mention chains for every group.
pub struct ChainController {
    store: Arc<dyn SessionStore>,
    events: Arc<dyn EventEmitter>,
    executor: TurnExecutor,
    stopped: DashSet<String>,
    settings: ChainSettings,
    extractor: Arc<dyn DocumentExtractor>,
}

impl ChainController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: Arc<dyn AgentRegistry>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            executor: TurnExecutor::new(store.clone(), registry),
            store,
            events,
            stopped: DashSet::new(),
            settings: ChainSettings::default(),
            extractor: Arc::new(PlainTextExtractor),
        }
    }

    /// Build a controller with chain limits and timeouts from configuration.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        registry: Arc<dyn AgentRegistry>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        let executor = TurnExecutor::from_config(config, store.clone(), registry);
        Self {
            executor,
            store,
            events,
            stopped: DashSet::new(),
            settings: ChainSettings::from(&config.chain),
            extractor: Arc::new(PlainTextExtractor),
        }
    }

    pub fn with_settings(mut self, settings: ChainSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_executor(mut self, executor: TurnExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// Disable auto-routing for a group. An in-flight turn still completes
    /// and is persisted; no further turn starts.
    pub fn stop_group_chain(&self, group_id: &str) {
        if self.stopped.insert(group_id.to_string()) {
            info!(group_id, "Chain stopped");
        }
        self.events.emit(ChatEvent::ChainStopped {
            group_id: group_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Re-enable auto-routing for a group.
    pub fn restart_group_chain(&self, group_id: &str) {
        if self.stopped.remove(group_id).is_some() {
            info!(group_id, "Chain restarted");
        }
        self.events.emit(ChatEvent::ChainRestarted {
            group_id: group_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn is_group_chain_active(&self, group_id: &str) -> bool {
        !self.stopped.contains(group_id)
    }

    /// Persist `text` from `sender` and follow mentions until the chain halts.
    ///
    /// Only storage failures are returned as errors; agent, tool and MCP
    /// failures end up in the group's history.
    pub async fn route_message(
        &self,
        group_id: &str,
        text: &str,
        sender: &str,
    ) -> Result<ChainOutcome, RoutingError> {
        if self.store.get_group(group_id).await?.is_none() {
            return Err(RoutingError::UnknownGroup(group_id.to_string()));
        }

        let members = self.store.list_group_agents(group_id).await?;
        let inbound = if sender != USER_SENDER && members.iter().any(|m| m == sender) {
            NewMessage::agent(group_id, sender, text)
        } else {
            NewMessage::new(group_id, sender, Role::User, text)
        };
        let mut current = self.persist(inbound).await?;

        let mut outcome = ChainOutcome {
            halt_reason: HaltReason::NoMention,
            turns: 0,
            visited: Vec::new(),
            inbound_id: current.id,
            message_ids: vec![current.id],
            addressed: None,
        };

        let halt_reason = loop {
            if !self.is_group_chain_active(group_id) {
                break HaltReason::Stopped;
            }
            if !current.role.is_routable() {
                break HaltReason::NotRoutable;
            }

            let members = self.store.list_group_agents(group_id).await?;
            let (agent_key, content) = match mention::parse(&current.content) {
                ParsedMention::Routed { agent_key, content } => (agent_key, content),
                ParsedMention::Ambiguous { keys } => {
                    debug!(group_id, ?keys, "Several agents addressed, not routing");
                    break HaltReason::Ambiguous;
                }
                ParsedMention::Terminal { user_mentioned: false }
                    if outcome.turns == 0
                        && current.role == Role::User
                        && self.settings.single_agent_autoroute
                        && members.len() == 1 =>
                {
                    debug!(group_id, agent = %members[0], "Routing to the only member");
                    (members[0].clone(), current.content.clone())
                }
                ParsedMention::Terminal { user_mentioned: true } => break HaltReason::UserAddressed,
                ParsedMention::Terminal { user_mentioned: false } => break HaltReason::NoMention,
            };

            if agent_key == current.sender {
                outcome.addressed = Some(agent_key);
                break HaltReason::SelfMention;
            }
            if !members.contains(&agent_key) {
                debug!(group_id, agent = %agent_key, "Mentioned agent is not a member");
                outcome.addressed = Some(agent_key);
                break HaltReason::NonMember;
            }
            if outcome.turns >= self.settings.max_iterations {
                let notice = NewMessage::system(
                    group_id,
                    format!(
                        "Chain cut off after {} agent turns. Mention an agent to continue.",
                        self.settings.max_iterations
                    ),
                )
                .with_metadata("message_type", "chain_cutoff")
                .with_metadata("max_iterations", self.settings.max_iterations)
                .with_metadata("pending_agent", agent_key.as_str());
                let stored = self.persist(notice).await?;
                outcome.message_ids.push(stored.id);
                warn!(
                    group_id,
                    max_iterations = self.settings.max_iterations,
                    pending = %agent_key,
                    "Chain iteration limit reached"
                );
                outcome.addressed = Some(agent_key);
                break HaltReason::IterationLimit;
            }

            outcome.visited.push(agent_key.clone());
            let result = match self.executor.execute(&agent_key, &content, group_id).await {
                Ok(result) => result,
                Err(TurnError::Store(e)) => return Err(e.into()),
                Err(TurnError::AgentNotFound(AgentNotFoundError::NotMember { .. })) => {
                    outcome.addressed = Some(agent_key);
                    break HaltReason::NonMember;
                }
                Err(TurnError::AgentNotFound(e)) => {
                    warn!(
                        group_id,
                        agent = %agent_key,
                        error = %e,
                        "Addressed member has no runtime"
                    );
                    outcome.addressed = Some(agent_key);
                    break HaltReason::UnknownAgent;
                }
            };
            outcome.turns += 1;

            if let Some(call) = result.call {
                let record = self.persist(call).await?;
                outcome.message_ids.push(record.id);
            }
            current = self.persist(result.message).await?;
            outcome.message_ids.push(current.id);

            if current.role == Role::Agent && mention::mentions_user(&current.content) {
                self.events.emit(ChatEvent::UserMentioned {
                    group_id: group_id.to_string(),
                    agent_key: agent_key.clone(),
                    content: current.content.clone(),
                    timestamp: Utc::now(),
                });
            }
        };

        outcome.halt_reason = halt_reason;
        info!(
            group_id,
            reason = %halt_reason,
            turns = outcome.turns,
            visited = ?outcome.visited,
            "Chain halted"
        );
        self.events.emit(ChatEvent::ChainHalted {
            group_id: group_id.to_string(),
            reason: halt_reason.as_str().to_string(),
            turns: outcome.turns,
            agent_key: outcome.addressed.clone(),
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    /// Record an uploaded document for `agent_key` and route `prompt` to it.
    pub async fn route_document_upload(
        &self,
        group_id: &str,
        agent_key: &str,
        filename: &str,
        bytes: &[u8],
        prompt: &str,
    ) -> Result<ChainOutcome, RoutingError> {
        if self.store.get_group(group_id).await?.is_none() {
            return Err(RoutingError::UnknownGroup(group_id.to_string()));
        }

        let extracted = self.extractor.extract(filename, bytes).await?;
        let document_id = Uuid::new_v4().to_string();
        let extension = file_extension(filename);
        let summary = extracted.summary.clone().unwrap_or_default();

        let mut content = format!("Document uploaded: {filename}\nTarget agent: @{agent_key}");
        if !summary.is_empty() {
            content.push_str(&format!("\nSummary: {summary}"));
        }

        let notice = NewMessage::new(group_id, USER_SENDER, Role::System, content)
            .with_metadata("message_type", DOCUMENT_UPLOAD)
            .with_metadata("document_id", document_id.as_str())
            .with_metadata("filename", filename)
            .with_metadata("target_agent", agent_key)
            .with_metadata("file_size", bytes.len())
            .with_metadata("file_extension", extension)
            .with_metadata("original_prompt", prompt)
            .with_metadata("content_summary", summary)
            .with_metadata(
                "extracted_content",
                truncate(&extracted.text, self.settings.document_excerpt_chars),
            );
        let stored = self.persist(notice).await?;
        info!(
            group_id,
            agent = agent_key,
            filename,
            document_id = %document_id,
            "Document uploaded"
        );

        let prompt = if prompt.trim().is_empty() {
            "Please analyze this document"
        } else {
            prompt.trim()
        };
        let synthetic = format!(
            "@{agent_key} {prompt}\n\n--- Document Uploaded ---\n\
             Filename: {filename}\nDocument ID: {document_id}"
        );
        let mut outcome = self.route_message(group_id, &synthetic, USER_SENDER).await?;
        outcome.message_ids.insert(0, stored.id);
        Ok(outcome)
    }

    async fn persist(&self, message: NewMessage) -> Result<Message, RoutingError> {
        let stored = self.store.append_message(message).await?;
        debug!(
            group_id = %stored.group_id,
            id = stored.id,
            sender = %stored.sender,
            role = %stored.role,
            "Message persisted"
        );
        self.events.emit(ChatEvent::MessageAppended {
            group_id: stored.group_id.clone(),
            message: stored.clone(),
        });
        Ok(stored)
    }
}

fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Extractor used when no richer one is configured: accepts UTF-8 text files.
pub struct PlainTextExtractor;

const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".markdown", ".csv", ".json", ".log", ".toml", ".yaml", ".yml",
];

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<ExtractedDocument, DocumentError> {
        let extension = file_extension(filename);
        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(DocumentError::Unsupported(filename.to_string()));
        }
        let text = std::str::from_utf8(bytes).map_err(|e| DocumentError::ExtractionFailed {
            filename: filename.to_string(),
            reason: e.to_string(),
        })?;
        Ok(ExtractedDocument {
            text: text.to_string(),
            summary: None,
        })
    }
}
