//! Configuration loading, validation, and management for huddle.
//!
//! Loads configuration from `~/.huddle/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use huddle_core::agent::AgentSpec;
use huddle_core::message::USER_SENDER;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.huddle/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default LLM provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Session store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Chain routing limits
    #[serde(default)]
    pub chain: ChainConfig,

    /// Per-call timeouts for external collaborators
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Defaults applied to agents that do not override them
    #[serde(default)]
    pub agent_defaults: AgentDefaults,

    /// Live event delivery
    #[serde(default)]
    pub events: EventsConfig,

    /// Per-provider endpoints and keys
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Agent descriptors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSpec>,
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("store", &self.store)
            .field("chain", &self.chain)
            .field("timeouts", &self.timeouts)
            .field("agent_defaults", &self.agent_defaults)
            .field("events", &self.events)
            .field("providers", &self.providers)
            .field("agents", &self.agents)
            .finish()
    }
}

/// An OpenAI-compatible endpoint.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL; well-known providers have a built-in default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `"sqlite"` or `"memory"`
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_db_path() -> PathBuf {
    AppConfig::config_dir().join("huddle.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Agent turns allowed per inbound message before the chain is cut off
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Messages of recent history handed to an agent per turn
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Route unaddressed user messages to the only member of a group
    #[serde(default = "default_true")]
    pub single_agent_autoroute: bool,

    /// Characters of extracted document text kept in upload metadata
    #[serde(default = "default_document_excerpt_chars")]
    pub document_excerpt_chars: usize,
}

fn default_max_iterations() -> usize {
    5
}
fn default_history_window() -> usize {
    20
}
fn default_document_excerpt_chars() -> usize {
    2000
}
fn default_true() -> bool {
    true
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_window: default_history_window(),
            single_agent_autoroute: true,
            document_excerpt_chars: default_document_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_secs")]
    pub llm_secs: u64,

    #[serde(default = "default_call_secs")]
    pub tool_secs: u64,

    #[serde(default = "default_call_secs")]
    pub mcp_secs: u64,
}

fn default_llm_secs() -> u64 {
    60
}
fn default_call_secs() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_secs: default_llm_secs(),
            tool_secs: default_call_secs(),
            mcp_secs: default_call_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Re-prompts allowed when a final reply does not carry exactly one mention
    #[serde(default = "default_mention_repair_attempts")]
    pub mention_repair_attempts: u32,

    /// Completion token cap per request; unset leaves it to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_mention_repair_attempts() -> u32 {
    2
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            mention_repair_attempts: default_mention_repair_attempts(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer size; lagging subscribers drop the oldest events
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.huddle/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `HUDDLE_DB_PATH`
    /// - `HUDDLE_MAX_CHAIN_ITERATIONS`
    ///
    /// When the file has no `api_key`, it is read from `HUDDLE_API_KEY`,
    /// `OPENROUTER_API_KEY` or `OPENAI_API_KEY`, in that order.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        tracing::debug!(agents = config.agents.len(), "Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("HUDDLE_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(path) = lookup("HUDDLE_DB_PATH") {
            self.store.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("HUDDLE_MAX_CHAIN_ITERATIONS") {
            self.chain.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "HUDDLE_MAX_CHAIN_ITERATIONS must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".huddle")
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Look up an agent descriptor by key.
    pub fn agent(&self, key: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.key == key)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "chain.max_iterations must be at least 1".into(),
            ));
        }

        if self.chain.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "chain.history_window must be at least 1".into(),
            ));
        }

        let timeouts = &self.timeouts;
        if timeouts.llm_secs == 0 || timeouts.tool_secs == 0 || timeouts.mcp_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than 0 seconds".into(),
            ));
        }

        let temperature = self.agent_defaults.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::ValidationError(
                "agent_defaults.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}'",
                self.store.backend
            )));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            validate_agent_key(&agent.key)?;
            if !seen.insert(agent.key.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate agent key '{}'",
                    agent.key
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Agent keys are mention targets: word characters only, and never the
/// `user` sentinel.
fn validate_agent_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::ValidationError("agent key must not be empty".into()));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ConfigError::ValidationError(format!(
            "agent key '{key}' may only contain letters, digits and underscores"
        )));
    }
    if key.eq_ignore_ascii_case(USER_SENDER) {
        return Err(ConfigError::ValidationError(
            "agent key 'user' is reserved".into(),
        ));
    }
    Ok(())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            store: StoreConfig::default(),
            chain: ChainConfig::default(),
            timeouts: TimeoutConfig::default(),
            agent_defaults: AgentDefaults::default(),
            events: EventsConfig::default(),
            providers: BTreeMap::new(),
            agents: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for huddle_core::Error {
    fn from(err: ConfigError) -> Self {
        huddle_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain.max_iterations, 5);
        assert_eq!(config.chain.history_window, 20);
        assert!(config.chain.single_agent_autoroute);
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.chain.max_iterations, config.chain.max_iterations);
        assert_eq!(parsed.timeouts.llm_secs, config.timeouts.llm_secs);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.agent_defaults.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.chain.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.timeouts.mcp_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.store.backend, "sqlite");
        assert!(config.agents.is_empty());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_iterations = 5"));
        assert!(toml_str.contains("[timeouts]"));
    }

    #[test]
    fn agents_parse_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[chain]
max_iterations = 8

[[agents]]
key = "researcher"
name = "Researcher"
description = "Finds sources"
emoji = "R"
tools = ["web_search"]

[agents.mcp_servers.files]
command = "mcp-files"
args = ["--root", "/data"]

[[agents]]
key = "writer"
name = "Writer"
model = "gpt-4o"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.chain.max_iterations, 8);
        assert_eq!(config.chain.history_window, 20);
        assert_eq!(config.agents.len(), 2);

        let researcher = config.agent("researcher").unwrap();
        assert_eq!(researcher.tools, vec!["web_search"]);
        assert_eq!(
            researcher.mcp_servers["files"].command.as_deref(),
            Some("mcp-files")
        );
        assert_eq!(config.agent("writer").unwrap().model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[chain\nmax_iterations = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn duplicate_agent_keys_rejected() {
        let config = AppConfig {
            agents: vec![AgentSpec::new("a", "A"), AgentSpec::new("a", "Other A")],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reserved_and_invalid_keys_rejected() {
        assert!(validate_agent_key("user").is_err());
        assert!(validate_agent_key("User").is_err());
        assert!(validate_agent_key("").is_err());
        assert!(validate_agent_key("data-bot").is_err());
        assert!(validate_agent_key("agent_1").is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HUDDLE_DB_PATH", "/var/lib/huddle/chat.db"),
            ("HUDDLE_MAX_CHAIN_ITERATIONS", "12"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/var/lib/huddle/chat.db"));
        assert_eq!(config.chain.max_iterations, 12);
    }

    #[test]
    fn api_key_falls_back_through_env() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPENROUTER_API_KEY", "sk-or"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-or"));

        let mut configured = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        configured
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(configured.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_key: Some("local-secret".into()),
                api_url: Some("http://localhost:11434/v1".into()),
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("local-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("localhost:11434"));
    }

    #[test]
    fn bad_iteration_override_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "HUDDLE_MAX_CHAIN_ITERATIONS").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }
}
