//! Hub Error Types
//!
//! Centralized error taxonomy for the connection registry and fan-out engine.

use serde::Serialize;

use crate::domain::{ChannelId, SessionId, UserId};

/// Hub error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session not live: {0}")]
    SessionNotFound(SessionId),

    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("User {0} already has an active connection")]
    DuplicateConnection(UserId),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Busy: lock contention on {0}")]
    Busy(String),

    #[error("Hub is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Stable numeric code sent to clients in error frames.
    pub fn code(&self) -> u16 {
        match self {
            HubError::Internal(_) => 10000,
            HubError::NotFound(_) | HubError::SessionNotFound(_) => 10001,
            HubError::ChannelNotFound(_) => 10002,
            HubError::InvalidFrame(_) => 10003,
            HubError::DuplicateConnection(_) => 10005,
            HubError::Busy(_) => 10006,
            HubError::PayloadTooLarge { .. } => 10007,
            HubError::ShuttingDown => 10008,
        }
    }

    /// Whether a client may reasonably retry the same operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, HubError::Busy(_))
    }

    /// Client-facing error body.
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            HubError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        ErrorResponse {
            code: self.code(),
            message,
        }
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}
