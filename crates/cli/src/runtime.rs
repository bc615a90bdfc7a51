//! Wiring: configuration to store, providers, agents and the chain controller.

use huddle_agent::{AgentDirectory, ChainController, LlmAgent};
use huddle_config::AppConfig;
use huddle_core::agent::AgentRuntime;
use huddle_core::event::EventBus;
use huddle_core::store::SessionStore;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Everything a command needs to talk to groups.
pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<dyn SessionStore>,
    pub bus: Arc<EventBus>,
    pub controller: Arc<ChainController>,
}

/// Load configuration from `path`, or the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open the configured store only.
pub async fn open_store(
    config: &AppConfig,
) -> Result<Arc<dyn SessionStore>, Box<dyn std::error::Error>> {
    let store = huddle_store::open(&config.store.backend, &config.store.path).await?;
    Ok(store)
}

/// Build the LLM agents described in configuration.
pub fn build_agents(config: &AppConfig) -> Vec<Arc<dyn AgentRuntime>> {
    let router = huddle_providers::build_from_config(config);
    let mut agents: Vec<Arc<dyn AgentRuntime>> = Vec::new();

    for spec in &config.agents {
        let Some(provider) = router.for_agent(spec) else {
            warn!(agent = %spec.key, "No provider available, skipping agent");
            continue;
        };
        if !spec.tools.is_empty() {
            warn!(
                agent = %spec.key,
                tools = ?spec.tools,
                "No tool implementations are registered in the CLI"
            );
        }
        if !spec.mcp_servers.is_empty() {
            warn!(agent = %spec.key, "MCP servers are configured but no MCP client is attached");
        }
        agents.push(Arc::new(LlmAgent::from_defaults(
            spec.clone(),
            provider,
            &config.agent_defaults,
        )));
    }

    agents
}

impl Runtime {
    pub async fn start(config_path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = load_config(config_path)?;
        if !config.has_api_key() {
            warn!("No API key configured; set HUDDLE_API_KEY or api_key in the config");
        }
        let store = open_store(&config).await?;
        let bus = Arc::new(EventBus::new(config.events.capacity));
        let directory = Arc::new(AgentDirectory::with_agents(build_agents(&config)));
        let controller = Arc::new(ChainController::from_config(
            &config,
            store.clone(),
            directory,
            bus.clone(),
        ));

        Ok(Self {
            config,
            store,
            bus,
            controller,
        })
    }

    /// Fail early with a readable message if the group does not exist.
    pub async fn require_group(
        &self,
        group_id: &str,
    ) -> Result<huddle_core::Group, Box<dyn std::error::Error>> {
        self.store
            .get_group(group_id)
            .await?
            .ok_or_else(|| format!("No group with id {group_id}. Run `huddle group list`.").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::agent::AgentSpec;

    #[test]
    fn builds_one_agent_per_spec() {
        let mut config = AppConfig::default();
        config.agents.push(AgentSpec::new("writer", "Writer"));
        config.agents.push(AgentSpec::new("analyst", "Analyst"));

        let agents = build_agents(&config);
        let keys: Vec<&str> = agents.iter().map(|a| a.spec().key.as_str()).collect();
        assert_eq!(keys, vec!["writer", "analyst"]);
    }

    #[tokio::test]
    async fn memory_store_from_config() {
        let mut config = AppConfig::default();
        config.store.backend = "memory".into();
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "in_memory");
    }
}
