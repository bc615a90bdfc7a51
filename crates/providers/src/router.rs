//! Provider router: picks the LLM provider for each agent.

use crate::openai_compat::OpenAiCompatProvider;
use huddle_config::AppConfig;
use huddle_core::agent::AgentSpec;
use huddle_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes agents to their configured providers.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// The provider an agent should use: its own override, else the default.
    pub fn for_agent(&self, spec: &AgentSpec) -> Option<Arc<dyn Provider>> {
        match &spec.provider {
            Some(name) => self.get(name),
            None => self.default(),
        }
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` entry, the default provider and every provider
/// named by an agent are registered.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let default_provider = &config.agent_defaults.provider;
    let mut router = ProviderRouter::new(default_provider);

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.push(default_provider);
    names.extend(config.agents.iter().filter_map(|a| a.provider.as_ref()));

    for name in names {
        if router.get(name).is_some() {
            continue;
        }
        let provider_config = config.providers.get(name.as_str());
        let api_key = provider_config
            .and_then(|p| p.api_key.clone())
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();
        let base_url = provider_config
            .and_then(|p| p.api_url.clone())
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatProvider::new(name.as_str(), base_url, api_key)),
        );
    }

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
