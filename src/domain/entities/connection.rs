//! Connection handle capability.
//!
//! The registry never depends on a concrete transport. Anything that can
//! attempt a delivery within a time bound (a WebSocket writer, a test
//! double) can back a session.

use async_trait::async_trait;
use std::time::Duration;

use super::message::Delivery;

/// Per-target transport failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Transport capability held by the registry for each live session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Attempt to hand one delivery to the remote peer, giving up after
    /// `timeout`.
    async fn deliver(&self, delivery: &Delivery, timeout: Duration) -> Result<(), DeliveryError>;
}
