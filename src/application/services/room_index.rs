//! Room/Channel Index
//!
//! Maps channel identities to the identities of their subscribed sessions.
//! The index stores identities only; liveness is owned by the
//! [`ConnectionRegistry`](super::ConnectionRegistry), which is the only
//! writer and keeps both sides consistent under the session lock.
//!
//! Each channel also carries its sequence counter, so the counter lives
//! exactly as long as the channel does.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::{Channel, ChannelId, ChannelRetention, SessionId};

#[derive(Default)]
struct Room {
    members: HashSet<SessionId>,
    sequence: Arc<AtomicU64>,
}

/// Channel → subscriber sets, sharded by channel.
pub struct RoomIndex {
    channels: DashMap<ChannelId, Room>,
    retention: ChannelRetention,
}

impl RoomIndex {
    pub fn new(retention: ChannelRetention) -> Self {
        Self {
            channels: DashMap::new(),
            retention,
        }
    }

    pub fn retention(&self) -> ChannelRetention {
        self.retention
    }

    /// Add a session to a channel, creating the channel if absent.
    /// Returns `true` if the session was not already a subscriber.
    pub(crate) fn add_subscriber(&self, channel_id: &ChannelId, session_id: &SessionId) -> bool {
        let mut room = self.channels.entry(channel_id.clone()).or_default();
        let added = room.members.insert(session_id.clone());
        if added && room.members.len() == 1 {
            tracing::debug!(channel_id = %channel_id, "Channel created");
        }
        added
    }

    /// Remove a session from a channel. An emptied channel is dropped under
    /// the destroy retention policy, together with its sequence counter.
    pub(crate) fn remove_subscriber(&self, channel_id: &ChannelId, session_id: &SessionId) -> bool {
        let (removed, now_empty) = match self.channels.get_mut(channel_id) {
            Some(mut room) => {
                let removed = room.members.remove(session_id);
                (removed, room.members.is_empty())
            }
            None => return false,
        };

        if now_empty && self.retention == ChannelRetention::Destroy {
            // A concurrent subscribe may have refilled the set in between.
            if self
                .channels
                .remove_if(channel_id, |_, room| room.members.is_empty())
                .is_some()
            {
                tracing::debug!(channel_id = %channel_id, "Channel destroyed");
            }
        }

        removed
    }

    /// The channel's sequence counter, or `None` if the channel does not
    /// exist.
    pub(crate) fn sequence_counter(&self, channel_id: &ChannelId) -> Option<Arc<AtomicU64>> {
        self.channels
            .get(channel_id)
            .map(|room| Arc::clone(&room.sequence))
    }

    /// Last sequence number assigned on a channel (0 if none or unknown).
    pub fn last_sequence(&self, channel_id: &ChannelId) -> u64 {
        self.channels
            .get(channel_id)
            .map(|room| room.sequence.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Snapshot of a channel's subscribers. Empty if the channel is unknown.
    pub fn subscribers(&self, channel_id: &ChannelId) -> HashSet<SessionId> {
        self.channels
            .get(channel_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// Snapshot of one channel.
    pub fn channel(&self, channel_id: &ChannelId) -> Option<Channel> {
        self.channels.get(channel_id).map(|room| Channel {
            id: channel_id.clone(),
            subscribers: room.members.clone(),
        })
    }

    pub fn contains(&self, channel_id: &ChannelId) -> bool {
        self.channels.contains_key(channel_id)
    }

    pub fn subscriber_count(&self, channel_id: &ChannelId) -> usize {
        self.channels
            .get(channel_id)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }
}
