//! `huddle chat`: interactive group chat.
//!
//! Lines are routed as user messages. Chains run in the background so
//! `/stop` can interrupt one that is still going.

use crate::commands::{format_message, halt_hint};
use crate::runtime::Runtime;
use huddle_core::event::ChatEvent;
use huddle_core::message::{Role, USER_SENDER};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// One parsed line of chat input.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Stop,
    Restart,
    Upload {
        agent: String,
        path: String,
        prompt: String,
    },
    Help,
    Exit,
    Empty,
    Invalid(String),
}

/// Parse a line typed by the user.
pub fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    if line == "exit" || line == "quit" {
        return ChatInput::Exit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Message(line.to_string());
    };

    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match name {
        "stop" => ChatInput::Stop,
        "restart" => ChatInput::Restart,
        "help" => ChatInput::Help,
        "exit" | "quit" => ChatInput::Exit,
        "upload" => {
            let mut args = rest.splitn(3, char::is_whitespace);
            let agent = args.next().unwrap_or_default().trim_start_matches('@');
            let path = args.next().unwrap_or_default();
            let prompt = args.next().unwrap_or_default().trim();
            if agent.is_empty() || path.is_empty() {
                ChatInput::Invalid("usage: /upload <agent> <path> [prompt]".into())
            } else {
                ChatInput::Upload {
                    agent: agent.to_string(),
                    path: path.to_string(),
                    prompt: prompt.to_string(),
                }
            }
        }
        other => ChatInput::Invalid(format!("unknown command /{other}, try /help")),
    }
}

const HELP: &str = "\
  @agent <text>                    address an agent
  /stop                            stop auto-routing in this group
  /restart                         resume auto-routing
  /upload <agent> <path> [prompt]  share a text document with an agent
  /exit                            leave";

pub async fn run(
    config_path: Option<&Path>,
    group_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::start(config_path).await?;
    let group = runtime.require_group(group_id).await?;

    println!();
    println!("  {} ({})", group.name, group.id);
    println!("  Members: {}", group.members.join(", "));
    println!("  Chains stop after {} agent turns.", runtime.config.chain.max_iterations);
    println!("  Type /help for commands.");
    println!();

    for message in runtime.store.get_history(group_id, 10).await? {
        println!("{}", format_message(&message));
    }

    let printer = tokio::spawn(print_events(runtime.bus.subscribe(), group_id.to_string()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            ChatInput::Empty => {}
            ChatInput::Exit => break,
            ChatInput::Help => println!("{HELP}"),
            ChatInput::Invalid(reason) => println!("  {reason}"),
            ChatInput::Stop => {
                runtime.controller.stop_group_chain(group_id);
                println!("  ⏸  Auto-routing stopped");
            }
            ChatInput::Restart => {
                runtime.controller.restart_group_chain(group_id);
                println!("  ▶  Auto-routing resumed");
            }
            ChatInput::Message(text) => {
                let controller = runtime.controller.clone();
                let group_id = group_id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = controller.route_message(&group_id, &text, USER_SENDER).await {
                        eprintln!("  ❌ {e}");
                    }
                });
            }
            ChatInput::Upload { agent, path, prompt } => {
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        println!("  ❌ Cannot read {path}: {e}");
                        continue;
                    }
                };
                let filename = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                let controller = runtime.controller.clone();
                let group_id = group_id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = controller
                        .route_document_upload(&group_id, &agent, &filename, &bytes, &prompt)
                        .await
                    {
                        eprintln!("  ❌ {e}");
                    }
                });
            }
        }
    }

    printer.abort();
    Ok(())
}

async fn print_events(
    mut rx: tokio::sync::broadcast::Receiver<std::sync::Arc<ChatEvent>>,
    group_id: String,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if event.group_id() != group_id {
            continue;
        }
        match &*event {
            ChatEvent::MessageAppended { message, .. } if message.role != Role::User => {
                println!("{}", format_message(message));
            }
            ChatEvent::UserMentioned { agent_key, .. } => {
                println!("\x07  🔔 @{agent_key} is waiting for you");
            }
            ChatEvent::ChainHalted {
                reason,
                turns,
                agent_key,
                ..
            } => {
                println!("  -- {reason} ({turns} agent turns)");
                if let Some(hint) = halt_hint(reason, agent_key.as_deref()) {
                    println!("  ⚠️  {hint}");
                }
            }
            _ => {}
        }
    }
}
