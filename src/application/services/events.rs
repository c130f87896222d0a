//! Hub Events
//!
//! Structured lifecycle events for external logging/metrics collaborators.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::{ChannelId, SessionId, UserId};

/// Lifecycle event emitted by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HubEvent {
    SessionRegistered {
        session_id: SessionId,
        user_id: UserId,
    },
    SessionEvicted {
        session_id: SessionId,
        user_id: UserId,
    },
    PublishCompleted {
        channel_id: ChannelId,
        sequence: u64,
        delivered: usize,
        failed: usize,
    },
}

impl HubEvent {
    /// Get the event name for dispatch
    pub fn event_name(&self) -> &'static str {
        match self {
            HubEvent::SessionRegistered { .. } => "SESSION_REGISTERED",
            HubEvent::SessionEvicted { .. } => "SESSION_EVICTED",
            HubEvent::PublishCompleted { .. } => "PUBLISH_COMPLETED",
        }
    }
}

/// Broadcast fan-out of hub events. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no listeners is not an error.
    pub fn emit(&self, event: HubEvent) {
        let _ = self.tx.send(event);
    }
}
