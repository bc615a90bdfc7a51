//! LLM provider implementations for huddle.
//!
//! All providers implement the `huddle_core::provider::Provider` trait.
//! The router selects the provider for each agent based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
