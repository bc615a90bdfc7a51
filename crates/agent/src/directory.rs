//! In-process agent registry.

use async_trait::async_trait;
use huddle_core::agent::{AgentRegistry, AgentRuntime, AgentSpec};
use huddle_core::error::AgentNotFoundError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// The set of live agents, keyed by agent key.
///
/// Agents are replaced wholesale on [`refresh`](Self::refresh) after the
/// configured set changes; between refreshes the set is read-only for the
/// chain engine.
pub struct AgentDirectory {
    agents: RwLock<HashMap<String, Arc<dyn AgentRuntime>>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Build a directory from an initial set of agents.
    pub fn with_agents(agents: impl IntoIterator<Item = Arc<dyn AgentRuntime>>) -> Self {
        let map = agents
            .into_iter()
            .map(|a| (a.spec().key.clone(), a))
            .collect();
        Self {
            agents: RwLock::new(map),
        }
    }

    /// Add or replace one agent.
    pub async fn register(&self, agent: Arc<dyn AgentRuntime>) {
        let key = agent.spec().key.clone();
        self.agents.write().await.insert(key, agent);
    }

    /// Remove one agent. Returns `false` if it was not registered.
    pub async fn remove(&self, agent_key: &str) -> bool {
        self.agents.write().await.remove(agent_key).is_some()
    }

    /// Replace every agent at once.
    pub async fn refresh(&self, agents: Vec<Arc<dyn AgentRuntime>>) {
        let map: HashMap<_, _> = agents
            .into_iter()
            .map(|a| (a.spec().key.clone(), a))
            .collect();
        let count = map.len();
        *self.agents.write().await = map;
        info!(agents = count, "Agent directory refreshed");
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRegistry for AgentDirectory {
    async fn get_agent(
        &self,
        agent_key: &str,
    ) -> Result<Arc<dyn AgentRuntime>, AgentNotFoundError> {
        self.agents
            .read()
            .await
            .get(agent_key)
            .cloned()
            .ok_or_else(|| AgentNotFoundError::Unknown(agent_key.to_string()))
    }

    async fn specs(&self) -> Vec<AgentSpec> {
        let mut specs: Vec<AgentSpec> = self
            .agents
            .read()
            .await
            .values()
            .map(|a| a.spec().clone())
            .collect();
        specs.sort_by(|a, b| a.key.cmp(&b.key));
        specs
    }
}
