//! Mention routing and turn execution for huddle.
//!
//! A user posts into a group; [`ChainController`] persists the message,
//! routes it to the single `@mentioned` agent through [`TurnExecutor`],
//! persists the reply and keeps following mentions until the chain halts:
//!
//! 1. **Parse** the latest message for exactly one addressed agent
//! 2. **Execute** that agent's turn: final reply, tool call or MCP call
//! 3. **Persist** the outcome and emit it to live subscribers
//! 4. **Repeat** until `@user`, no mention, a stop request, or the iteration guard
//!
//! [`LlmAgent`] is the LLM-backed agent runtime and [`AgentDirectory`] the
//! registry that resolves keys to runtimes.

pub mod action;
pub mod chain;
pub mod directory;
pub mod executor;
pub mod llm_agent;
pub mod mention;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use action::decode_action;
pub use chain::{ChainController, ChainOutcome, ChainSettings, HaltReason, PlainTextExtractor};
pub use directory::AgentDirectory;
pub use executor::{ExecutorSettings, TurnError, TurnExecutor, TurnResult, ensure_mention};
pub use llm_agent::LlmAgent;
pub use mention::ParsedMention;
