//! huddle CLI: the main entry point.
//!
//! Commands:
//! - `init`    Write a starter config
//! - `status`  Show configuration, agents and groups
//! - `group`   Create, inspect and edit groups
//! - `send`    Post one message and run the chain it starts
//! - `chat`    Interactive group chat

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "huddle",
    about = "huddle: multi-agent group chat with @mention routing",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.huddle/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "HUDDLE_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration
    Init,

    /// Show configuration, agents and groups
    Status,

    /// Manage groups and their members
    Group {
        #[command(subcommand)]
        action: commands::group::GroupAction,
    },

    /// Post one message to a group and wait for the chain to halt
    Send {
        /// Group id
        #[arg(short, long)]
        group: String,

        /// Message text, e.g. "@analyst summarize the thread"
        message: String,
    },

    /// Chat interactively in a group
    Chat {
        /// Group id
        #[arg(short, long)]
        group: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init => commands::init::run(config_path).await?,
        Commands::Status => commands::status::run(config_path).await?,
        Commands::Group { action } => commands::group::run(config_path, action).await?,
        Commands::Send { group, message } => {
            commands::send::run(config_path, &group, &message).await?
        }
        Commands::Chat { group } => commands::chat::run(config_path, &group).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send() {
        let cli = Cli::try_parse_from(["huddle", "send", "-g", "g1", "@writer hello"]).unwrap();
        match cli.command {
            Commands::Send { group, message } => {
                assert_eq!(group, "g1");
                assert_eq!(message, "@writer hello");
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let args = ["huddle", "status", "--verbose", "--config", "/tmp/h.toml"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/h.toml")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn group_create_splits_agent_list() {
        let args = ["huddle", "group", "create", "Docs", "--agents", "writer,reviewer"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Group {
                action: commands::group::GroupAction::Create { name, agents },
            } => {
                assert_eq!(name, "Docs");
                assert_eq!(agents, vec!["writer", "reviewer"]);
            }
            _ => panic!("expected group create"),
        }
    }

    #[test]
    fn chat_requires_group() {
        assert!(Cli::try_parse_from(["huddle", "chat"]).is_err());
    }
}
