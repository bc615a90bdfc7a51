//! Session store trait: durable groups, membership and message history.
//!
//! Implementations: SQLite and in-memory (for testing), both in `huddle-store`.

use crate::document::DocumentRef;
use crate::error::StoreError;
use crate::message::{Group, Message, NewMessage};
use async_trait::async_trait;

/// Default number of messages returned by a history read.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// The core SessionStore trait.
///
/// Messages are append-only. The only way to remove one is to delete its
/// whole group.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    // --- Groups ---

    /// Create an empty group.
    async fn create_group(&self, name: &str) -> Result<Group, StoreError>;

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, StoreError>;

    /// All groups, most recently updated first.
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;

    async fn rename_group(&self, group_id: &str, name: &str) -> Result<(), StoreError>;

    /// Delete a group together with its messages and membership.
    /// Returns `false` if it did not exist.
    async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError>;

    // --- Membership ---

    /// Add an agent to a group. Adding an existing member is a no-op.
    async fn add_agent_to_group(&self, group_id: &str, agent_key: &str) -> Result<(), StoreError>;

    async fn remove_agent_from_group(
        &self,
        group_id: &str,
        agent_key: &str,
    ) -> Result<(), StoreError>;

    /// Member agent keys, sorted.
    async fn list_group_agents(&self, group_id: &str) -> Result<Vec<String>, StoreError>;

    // --- Messages ---

    /// Append a message and return it with its assigned id and timestamp.
    async fn append_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// The `limit` most recent messages of a group, oldest first.
    async fn get_history(&self, group_id: &str, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Document uploads recorded in a group, newest first.
    async fn list_documents(&self, group_id: &str) -> Result<Vec<DocumentRef>, StoreError>;
}
