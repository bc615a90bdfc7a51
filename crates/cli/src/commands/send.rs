//! `huddle send`: post one message and print the chain it starts.

use crate::commands::{format_message, halt_hint};
use crate::runtime::Runtime;
use huddle_agent::ChainOutcome;
use huddle_core::message::{Message, USER_SENDER};
use huddle_core::store::SessionStore;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    group_id: &str,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::start(config_path).await?;
    runtime.require_group(group_id).await?;

    let outcome = runtime.controller.route_message(group_id, text, USER_SENDER).await?;
    for message in chain_messages(runtime.store.as_ref(), group_id, &outcome).await? {
        println!("{}", format_message(&message));
    }
    println!("-- {} ({} agent turns)", outcome.halt_reason, outcome.turns);
    if let Some(hint) = halt_hint(outcome.halt_reason.as_str(), outcome.addressed.as_deref()) {
        println!("{hint}");
    }

    Ok(())
}

/// The messages persisted by one chain, in order.
pub async fn chain_messages(
    store: &dyn SessionStore,
    group_id: &str,
    outcome: &ChainOutcome,
) -> Result<Vec<Message>, Box<dyn std::error::Error>> {
    // Other writers may have appended meanwhile, so read a wider window and filter.
    let window = outcome.message_ids.len() * 2 + 10;
    let history = store.get_history(group_id, window).await?;
    Ok(history
        .into_iter()
        .filter(|m| outcome.message_ids.contains(&m.id))
        .collect())
}
