//! Message entity, delivery records and the persistence seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{ChannelId, SessionId, UserId};

/// An accepted inbound message. Immutable once the sequence is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: SessionId,
    pub sender_user: UserId,
    pub channel_id: ChannelId,
    pub payload: Arc<[u8]>,
    /// Per-channel sequence number, starting at 1.
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
}

impl Message {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// One message addressed to one target session.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: SessionId,
    pub message: Arc<Message>,
}

impl Delivery {
    pub fn new(target: SessionId, message: Arc<Message>) -> Self {
        Self { target, message }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.message.channel_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    pub fn sequence(&self) -> u64 {
        self.message.sequence
    }
}

/// Outcome of a delivery attempt for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    /// The target left the channel (or disconnected) between the subscriber
    /// snapshot and the delivery attempt.
    SkippedNotSubscribed,
    FailedTransport,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::SkippedNotSubscribed => "skipped_not_subscribed",
            Self::FailedTransport => "failed_transport",
        }
    }
}

/// Per-target outcome record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub session_id: SessionId,
    pub outcome: DeliveryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(session_id: SessionId) -> Self {
        Self {
            session_id,
            outcome: DeliveryOutcome::Delivered,
            error: None,
        }
    }

    pub fn skipped(session_id: SessionId) -> Self {
        Self {
            session_id,
            outcome: DeliveryOutcome::SkippedNotSubscribed,
            error: None,
        }
    }

    pub fn failed(session_id: SessionId, error: impl ToString) -> Self {
        Self {
            session_id,
            outcome: DeliveryOutcome::FailedTransport,
            error: Some(error.to_string()),
        }
    }
}

/// Result of a completed publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub channel_id: ChannelId,
    pub sequence: u64,
    pub results: Vec<DeliveryResult>,
}

impl PublishReport {
    pub fn delivered_count(&self) -> usize {
        self.count(DeliveryOutcome::Delivered)
    }

    pub fn failed_count(&self) -> usize {
        self.count(DeliveryOutcome::FailedTransport)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(DeliveryOutcome::SkippedNotSubscribed)
    }

    /// Outcome recorded for a given target, if it was part of the fan-out.
    pub fn outcome_for(&self, session_id: &SessionId) -> Option<DeliveryOutcome> {
        self.results
            .iter()
            .find(|r| &r.session_id == session_id)
            .map(|r| r.outcome)
    }

    fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Persistence failure reported by a [`MessageStore`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator. The hub hands every accepted message to the
/// store; it never reads messages back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: &Message) -> Result<(), StoreError>;
}
