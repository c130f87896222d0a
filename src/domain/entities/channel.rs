//! Channel entity.

use std::collections::HashSet;

use crate::domain::{ChannelId, SessionId};

/// Snapshot of a channel and its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub subscribers: HashSet<SessionId>,
}

impl Channel {
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
