//! Message Store Implementations
//!
//! Persistence collaborators for accepted messages.

use async_trait::async_trait;

use crate::domain::{Message, MessageStore, StoreError};

/// Store that accepts and discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMessageStore;

#[async_trait]
impl MessageStore for NoopMessageStore {
    async fn append(&self, message: &Message) -> Result<(), StoreError> {
        tracing::trace!(
            channel_id = %message.channel_id,
            sequence = message.sequence,
            bytes = message.payload_len(),
            "Message not persisted"
        );
        Ok(())
    }
}
