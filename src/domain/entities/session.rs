//! Session entity.
//!
//! A session is one authenticated, live connection. The registry owns the
//! mutable session record and the connection handle; callers only ever see
//! the read-only [`Session`] snapshot returned by a lookup.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::{ChannelId, SessionId, UserId};

/// Presence phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// Heartbeats are arriving on time.
    Active,
    /// Heartbeat timeout elapsed; the session is evicted unless touched
    /// before the grace period ends.
    PendingEviction,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingEviction => "pending_eviction",
        }
    }
}

/// Point-in-time view of a live session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    pub last_activity: Instant,
    pub presence: PresenceState,
    pub subscriptions: HashSet<ChannelId>,
}

impl Session {
    /// Time since the session was last touched.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn is_subscribed(&self, channel_id: &ChannelId) -> bool {
        self.subscriptions.contains(channel_id)
    }

    pub fn is_active(&self) -> bool {
        self.presence == PresenceState::Active
    }
}
