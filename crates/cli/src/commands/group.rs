//! `huddle group`: create, inspect and edit groups.

use crate::commands::format_message;
use crate::runtime;
use clap::Subcommand;
use huddle_config::AppConfig;
use huddle_core::store::SessionStore;
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum GroupAction {
    /// Create a group, optionally with initial members
    Create {
        name: String,

        /// Comma-separated agent keys
        #[arg(short, long, value_delimiter = ',')]
        agents: Vec<String>,
    },

    /// List all groups
    List,

    /// Show a group's members and recent history
    Show {
        group: String,

        /// Number of recent messages to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Add an agent to a group
    Add { group: String, agent: String },

    /// Remove an agent from a group
    Remove { group: String, agent: String },

    /// Rename a group
    Rename { group: String, name: String },

    /// Delete a group with its members and history
    Delete { group: String },
}

pub async fn run(
    config_path: Option<&Path>,
    action: GroupAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config(config_path)?;
    let store = runtime::open_store(&config).await?;
    for line in execute(&config, store.as_ref(), action).await? {
        println!("{line}");
    }
    Ok(())
}

/// Apply `action` and return the lines to print.
pub async fn execute(
    config: &AppConfig,
    store: &dyn SessionStore,
    action: GroupAction,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut out = Vec::new();

    match action {
        GroupAction::Create { name, agents } => {
            let group = store.create_group(&name).await?;
            for agent in &agents {
                check_agent(config, agent, &mut out);
                store.add_agent_to_group(&group.id, agent).await?;
            }
            out.push(format!("✅ Created group {} ({})", group.name, group.id));
        }
        GroupAction::List => {
            let groups = store.list_groups().await?;
            if groups.is_empty() {
                out.push("No groups yet. Create one with `huddle group create <name>`.".into());
            }
            for group in groups {
                out.push(format!("{}  {}  [{}]", group.id, group.name, group.members.join(", ")));
            }
        }
        GroupAction::Show { group, limit } => {
            let found = store
                .get_group(&group)
                .await?
                .ok_or_else(|| format!("No group with id {group}"))?;
            out.push(format!("{} ({})", found.name, found.id));
            out.push(format!("Members: {}", found.members.join(", ")));
            for message in store.get_history(&group, limit).await? {
                out.push(format_message(&message));
            }
        }
        GroupAction::Add { group, agent } => {
            check_agent(config, &agent, &mut out);
            store.add_agent_to_group(&group, &agent).await?;
            out.push(format!("✅ Added @{agent}"));
        }
        GroupAction::Remove { group, agent } => {
            store.remove_agent_from_group(&group, &agent).await?;
            out.push(format!("✅ Removed @{agent}"));
        }
        GroupAction::Rename { group, name } => {
            store.rename_group(&group, &name).await?;
            out.push(format!("✅ Renamed to {name}"));
        }
        GroupAction::Delete { group } => {
            if store.delete_group(&group).await? {
                out.push(format!("✅ Deleted {group}"));
            } else {
                out.push(format!("No group with id {group}"));
            }
        }
    }

    Ok(out)
}

fn check_agent(config: &AppConfig, agent: &str, out: &mut Vec<String>) {
    if config.agent(agent).is_none() {
        out.push(format!("⚠️  @{agent} is not configured; mentions of it will halt the chain"));
    }
}
