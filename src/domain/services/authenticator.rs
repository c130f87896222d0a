//! Authentication seam.
//!
//! The hub only accepts connections for users that an external collaborator
//! has already authenticated. Transport adapters resolve a presented
//! credential to a [`UserId`] through this trait before calling
//! `accept_connection`.

use async_trait::async_trait;

use crate::domain::UserId;

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,
}

/// Resolves a client credential to a user identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}
