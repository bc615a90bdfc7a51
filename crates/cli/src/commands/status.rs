//! `huddle status`: show configuration, agents and groups.

use crate::runtime;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config(config_path)?;

    println!("huddle status");
    println!("=============");
    println!("  Store:          {} ({})", config.store.backend, config.store.path.display());
    println!("  Provider:       {}", config.agent_defaults.provider);
    println!("  Model:          {}", config.agent_defaults.model);
    println!("  API key:        {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Max iterations: {}", config.chain.max_iterations);
    println!("  History window: {}", config.chain.history_window);
    println!(
        "  Timeouts:       llm {}s, tool {}s, mcp {}s",
        config.timeouts.llm_secs, config.timeouts.tool_secs, config.timeouts.mcp_secs
    );

    println!("\n  Agents ({}):", config.agents.len());
    for agent in &config.agents {
        let model = agent.model.as_deref().unwrap_or(&config.agent_defaults.model);
        println!("    @{:<16} {} {}  [{model}]", agent.key, agent.emoji, agent.name);
    }

    let store = runtime::open_store(&config).await?;
    let groups = store.list_groups().await?;
    println!("\n  Groups ({}):", groups.len());
    for group in &groups {
        println!("    {}  {}  [{}]", group.id, group.name, group.members.join(", "));
    }

    if !config.has_api_key() {
        println!("\n  ⚠️  No API key configured. Set HUDDLE_API_KEY or add api_key to the config.");
    }

    Ok(())
}
