//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_core::document::DocumentRef;
use huddle_core::error::StoreError;
use huddle_core::message::{Group, Message, NewMessage};
use huddle_core::store::SessionStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

struct GroupRecord {
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    members: BTreeSet<String>,
}

impl GroupRecord {
    fn to_group(&self, id: &str) -> Group {
        Group {
            id: id.to_string(),
            name: self.name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            members: self.members.iter().cloned().collect(),
        }
    }
}

#[derive(Default)]
struct State {
    groups: HashMap<String, GroupRecord>,
    messages: Vec<Message>,
    next_id: i64,
}

impl State {
    fn group_mut(&mut self, group_id: &str) -> Result<&mut GroupRecord, StoreError> {
        self.groups
            .get_mut(group_id)
            .ok_or_else(|| StoreError::GroupNotFound(group_id.to_string()))
    }
}

/// A session store that keeps everything in process memory.
/// Nothing survives a restart.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_group(&self, name: &str) -> Result<Group, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = GroupRecord {
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            members: BTreeSet::new(),
        };
        let group = record.to_group(&id);
        self.state.write().await.groups.insert(id, record);
        Ok(group)
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, StoreError> {
        let state = self.state.read().await;
        Ok(state.groups.get(group_id).map(|g| g.to_group(group_id)))
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .groups
            .iter()
            .map(|(id, record)| record.to_group(id))
            .collect();
        groups.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(groups)
    }

    async fn rename_group(&self, group_id: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let group = state.group_mut(group_id)?;
        group.name = name.to_string();
        group.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.groups.remove(group_id).is_none() {
            return Ok(false);
        }
        state.messages.retain(|m| m.group_id != group_id);
        Ok(true)
    }

    async fn add_agent_to_group(&self, group_id: &str, agent_key: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let group = state.group_mut(group_id)?;
        if group.members.insert(agent_key.to_string()) {
            group.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_agent_from_group(
        &self,
        group_id: &str,
        agent_key: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let group = state.group_mut(group_id)?;
        if group.members.remove(agent_key) {
            group.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_group_agents(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .get(group_id)
            .map(|g| g.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.group_mut(&message.group_id)?.updated_at = now;

        state.next_id += 1;
        let stored = message.into_message(state.next_id, now);
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn get_history(&self, group_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let mut recent: Vec<Message> = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.group_id == group_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn list_documents(&self, group_id: &str) -> Result<Vec<DocumentRef>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| m.group_id == group_id)
            .filter_map(DocumentRef::from_message)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::message::{DOCUMENT_UPLOAD, Role};

    #[tokio::test]
    async fn create_and_get_group() {
        let store = InMemoryStore::new();
        let group = store.create_group("Claims").await.unwrap();
        assert!(!group.id.is_empty());

        let fetched = store.get_group(&group.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Claims");
        assert!(fetched.members.is_empty());
        assert!(store.get_group("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn membership_is_sorted_and_idempotent() {
        let store = InMemoryStore::new();
        let group = store.create_group("g").await.unwrap();
        store.add_agent_to_group(&group.id, "writer").await.unwrap();
        store.add_agent_to_group(&group.id, "analyst").await.unwrap();
        store.add_agent_to_group(&group.id, "writer").await.unwrap();

        assert_eq!(
            store.list_group_agents(&group.id).await.unwrap(),
            vec!["analyst", "writer"]
        );

        store.remove_agent_from_group(&group.id, "writer").await.unwrap();
        assert_eq!(store.list_group_agents(&group.id).await.unwrap(), vec!["analyst"]);
    }

    #[tokio::test]
    async fn membership_change_bumps_updated_at() {
        let store = InMemoryStore::new();
        let group = store.create_group("g").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.add_agent_to_group(&group.id, "a").await.unwrap();
        let after = store.get_group(&group.id).await.unwrap().unwrap();
        assert!(after.updated_at > group.updated_at);
    }

    #[tokio::test]
    async fn append_to_unknown_group_fails() {
        let store = InMemoryStore::new();
        let err = store.append_message(NewMessage::user("nope", "hi")).await.unwrap_err();
        assert!(matches!(err, StoreError::GroupNotFound(_)));
    }

    #[tokio::test]
    async fn history_returns_most_recent_in_order() {
        let store = InMemoryStore::new();
        let group = store.create_group("g").await.unwrap();
        let other = store.create_group("other").await.unwrap();
        for i in 0..5 {
            store
                .append_message(NewMessage::user(&group.id, format!("msg {i}")))
                .await
                .unwrap();
            store
                .append_message(NewMessage::user(&other.id, "noise"))
                .await
                .unwrap();
        }

        let history = store.get_history(&group.id, 3).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 2", "msg 3", "msg 4"]);
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn delete_group_removes_messages() {
        let store = InMemoryStore::new();
        let group = store.create_group("g").await.unwrap();
        store.append_message(NewMessage::user(&group.id, "hi")).await.unwrap();

        assert!(store.delete_group(&group.id).await.unwrap());
        assert!(!store.delete_group(&group.id).await.unwrap());
        assert!(store.get_history(&group.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_documents_newest_first() {
        let store = InMemoryStore::new();
        let group = store.create_group("g").await.unwrap();
        for name in ["a.pdf", "b.pdf"] {
            store
                .append_message(
                    NewMessage::system(&group.id, format!("Document uploaded: {name}"))
                        .with_metadata("message_type", DOCUMENT_UPLOAD)
                        .with_metadata("filename", name)
                        .with_metadata("target_agent", "analyst"),
                )
                .await
                .unwrap();
        }
        store.append_message(NewMessage::user(&group.id, "hello")).await.unwrap();

        let docs = store.list_documents(&group.id).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "b.pdf");
    }

    #[tokio::test]
    async fn rename_unknown_group_fails() {
        let store = InMemoryStore::new();
        assert!(store.rename_group("nope", "x").await.is_err());

        let group = store.create_group("old").await.unwrap();
        store.rename_group(&group.id, "new").await.unwrap();
        let fetched = store.get_group(&group.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "new");
    }

    #[tokio::test]
    async fn appended_message_keeps_role_and_metadata() {
        let store = InMemoryStore::new();
        let group = store.create_group("g").await.unwrap();
        let msg = store
            .append_message(NewMessage::agent(&group.id, "writer", "Draft ready @user"))
            .await
            .unwrap();
        assert_eq!(msg.id, 1);
        assert_eq!(msg.role, Role::Agent);
        assert_eq!(msg.agent_key(), "writer");
    }
}
