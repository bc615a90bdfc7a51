//! Chat event system: live updates for subscribers watching a group.
//!
//! The chain controller publishes an event for every persisted message and
//! every halt. Delivery is best-effort: a slow or absent subscriber never
//! slows down or aborts a chain.

use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All chat events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was appended to a group's history
    MessageAppended {
        group_id: String,
        message: Message,
    },

    /// An agent reply addressed the user
    UserMentioned {
        group_id: String,
        agent_key: String,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// A chain finished
    ChainHalted {
        group_id: String,
        reason: String,
        turns: usize,
        /// Agent the final message addressed, when it was never run
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_key: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Auto-routing was disabled for a group
    ChainStopped {
        group_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Auto-routing was re-enabled for a group
    ChainRestarted {
        group_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ChatEvent {
    pub fn group_id(&self) -> &str {
        match self {
            Self::MessageAppended { group_id, .. }
            | Self::UserMentioned { group_id, .. }
            | Self::ChainHalted { group_id, .. }
            | Self::ChainStopped { group_id, .. }
            | Self::ChainRestarted { group_id, .. } => group_id,
        }
    }
}

/// Anything that forwards chat events to live subscribers.
///
/// `emit` must not block and must not fail the caller.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: ChatEvent);
}

/// A broadcast-based event bus for chat events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Subscribers filter by `group_id` for the group they display.
pub struct EventBus {
    sender: broadcast::Sender<Arc<ChatEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChatEvent>> {
        self.sender.subscribe()
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: ChatEvent) {
        self.publish(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(ChatEvent::ChainStopped {
            group_id: "g1".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.group_id(), "g1");
        assert!(matches!(event.as_ref(), ChatEvent::ChainStopped { .. }));
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.emit(ChatEvent::ChainHalted {
            group_id: "g1".into(),
            reason: "user_addressed".into(),
            turns: 1,
            agent_key: None,
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = ChatEvent::ChainRestarted {
            group_id: "g1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chain_restarted""#));
    }
}
