//! Connection Registry
//!
//! Tracks live sessions keyed by session identity and owns their connection
//! handles. Every mutation of a session's channel membership goes through
//! the registry so that the session's subscription set and the
//! [`RoomIndex`] stay consistent.
//!
//! # Locking
//!
//! - `sessions` and `user_sessions` are sharded (`DashMap`); no shard guard
//!   is held while another shard of the same map is locked.
//! - Each session has its own `parking_lot::Mutex`. Lock order is always
//!   session lock, then a room index shard.
//! - A session leaves every channel before it leaves `sessions`, so a
//!   channel never names a session the registry has already forgotten.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::room_index::RoomIndex;
use crate::domain::{
    ChannelId, ConnectionHandle, PresenceState, Session, SessionId, SessionPolicy, UserId,
};
use crate::infrastructure::metrics;
use crate::shared::error::HubError;

/// Mutable part of a session, guarded by the per-session lock.
#[derive(Debug)]
struct SlotState {
    last_activity: Instant,
    presence: PresenceState,
    pending_since: Option<Instant>,
    subscriptions: HashSet<ChannelId>,
    closed: bool,
}

/// Registry-owned session record.
struct SessionSlot {
    id: SessionId,
    user_id: UserId,
    connected_at: DateTime<Utc>,
    handle: Arc<dyn ConnectionHandle>,
    state: Mutex<SlotState>,
}

impl SessionSlot {
    fn new(id: SessionId, user_id: UserId, handle: Arc<dyn ConnectionHandle>) -> Self {
        Self {
            id,
            user_id,
            connected_at: Utc::now(),
            handle,
            state: Mutex::new(SlotState {
                last_activity: Instant::now(),
                presence: PresenceState::Active,
                pending_since: None,
                subscriptions: HashSet::new(),
                closed: false,
            }),
        }
    }

    fn snapshot(&self, state: &SlotState) -> Session {
        Session {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            connected_at: self.connected_at,
            last_activity: state.last_activity,
            presence: state.presence,
            subscriptions: state.subscriptions.clone(),
        }
    }
}

/// Live session registry.
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
    user_sessions: DashMap<UserId, HashSet<SessionId>>,
    rooms: Arc<RoomIndex>,
    policy: SessionPolicy,
    lock_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(rooms: Arc<RoomIndex>, policy: SessionPolicy, lock_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            rooms,
            policy,
            lock_timeout,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomIndex> {
        &self.rooms
    }

    /// Create a session for `user_id` backed by `handle`.
    ///
    /// Fails with `DuplicateConnection` when the single-session policy is in
    /// effect and the user already holds a live session.
    pub fn register(
        &self,
        user_id: UserId,
        handle: Arc<dyn ConnectionHandle>,
    ) -> Result<SessionId, HubError> {
        let session_id = SessionId::generate();
        let slot = Arc::new(SessionSlot::new(session_id.clone(), user_id.clone(), handle));

        match self.user_sessions.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                if self.policy == SessionPolicy::Single && !entry.get().is_empty() {
                    tracing::debug!(user_id = %user_id, "Rejected duplicate connection");
                    return Err(HubError::DuplicateConnection(user_id));
                }
                entry.get_mut().insert(session_id.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(HashSet::from([session_id.clone()]));
            }
        }

        self.sessions.insert(session_id.clone(), slot);
        self.update_gauges();

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            "Session registered"
        );

        Ok(session_id)
    }

    /// Snapshot of a live session.
    pub fn lookup(&self, session_id: &SessionId) -> Result<Session, HubError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| HubError::NotFound(session_id.clone()))?;
        let state = self.lock_state(&slot)?;
        if state.closed {
            return Err(HubError::NotFound(session_id.clone()));
        }
        Ok(slot.snapshot(&state))
    }

    /// Record activity. A session pending eviction becomes active again.
    pub fn touch(&self, session_id: &SessionId) -> Result<(), HubError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| HubError::NotFound(session_id.clone()))?;
        let mut state = self.lock_state(&slot)?;
        if state.closed {
            return Err(HubError::NotFound(session_id.clone()));
        }

        state.last_activity = Instant::now();
        if state.presence == PresenceState::PendingEviction {
            tracing::debug!(session_id = %session_id, "Session recovered from pending eviction");
        }
        state.presence = PresenceState::Active;
        state.pending_since = None;
        Ok(())
    }

    /// Remove a session and drop it from every channel it subscribed to.
    /// Returns `false` if the session was already gone.
    pub fn unregister(&self, session_id: &SessionId) -> bool {
        let Some(slot) = self.slot(session_id) else {
            return false;
        };

        let subscriptions = {
            // Cleanup must always complete, so this waits for the lock.
            let mut state = slot.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            std::mem::take(&mut state.subscriptions)
        };

        self.finish_removal(&slot, subscriptions);

        tracing::info!(
            user_id = %slot.user_id,
            session_id = %session_id,
            "Session unregistered"
        );
        true
    }

    /// Add a live session to a channel. Returns `false` if it was already
    /// subscribed.
    pub fn subscribe(&self, session_id: &SessionId, channel_id: &ChannelId) -> Result<bool, HubError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| HubError::SessionNotFound(session_id.clone()))?;
        let mut state = self.lock_state(&slot)?;
        if state.closed {
            return Err(HubError::SessionNotFound(session_id.clone()));
        }

        let added = state.subscriptions.insert(channel_id.clone());
        // Keep the index write under the session lock so that unregister
        // cannot interleave between the two sides.
        self.rooms.add_subscriber(channel_id, session_id);
        drop(state);

        if added {
            self.update_gauges();
            tracing::debug!(session_id = %session_id, channel_id = %channel_id, "Subscribed");
        }
        Ok(added)
    }

    /// Remove a live session from a channel. No-op if not subscribed.
    pub fn unsubscribe(
        &self,
        session_id: &SessionId,
        channel_id: &ChannelId,
    ) -> Result<bool, HubError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| HubError::SessionNotFound(session_id.clone()))?;
        let mut state = self.lock_state(&slot)?;
        if state.closed {
            return Err(HubError::SessionNotFound(session_id.clone()));
        }

        let removed = state.subscriptions.remove(channel_id);
        if removed {
            self.rooms.remove_subscriber(channel_id, session_id);
        }
        drop(state);

        if removed {
            self.update_gauges();
            tracing::debug!(session_id = %session_id, channel_id = %channel_id, "Unsubscribed");
        }
        Ok(removed)
    }

    /// Owner of a live session.
    pub fn user_of(&self, session_id: &SessionId) -> Result<UserId, HubError> {
        let slot = self
            .slot(session_id)
            .ok_or_else(|| HubError::NotFound(session_id.clone()))?;
        let state = self.lock_state(&slot)?;
        if state.closed {
            return Err(HubError::NotFound(session_id.clone()));
        }
        Ok(slot.user_id.clone())
    }

    /// Connection handle for a session that is live and still subscribed to
    /// `channel_id`; `None` otherwise.
    pub(crate) fn delivery_target(
        &self,
        session_id: &SessionId,
        channel_id: &ChannelId,
    ) -> Result<Option<Arc<dyn ConnectionHandle>>, HubError> {
        let Some(slot) = self.slot(session_id) else {
            return Ok(None);
        };
        let state = self.lock_state(&slot)?;
        if state.closed || !state.subscriptions.contains(channel_id) {
            return Ok(None);
        }
        Ok(Some(Arc::clone(&slot.handle)))
    }

    /// Move an active session idle for at least `min_idle` to pending
    /// eviction. Returns `true` on transition.
    pub(crate) fn demote(&self, session_id: &SessionId, min_idle: Duration, now: Instant) -> bool {
        let Some(slot) = self.slot(session_id) else {
            return false;
        };
        let mut state = slot.state.lock();
        if state.closed || state.presence != PresenceState::Active {
            return false;
        }
        if now.saturating_duration_since(state.last_activity) < min_idle {
            return false;
        }
        state.presence = PresenceState::PendingEviction;
        state.pending_since = Some(now);
        true
    }

    /// Remove a session that has been pending eviction for at least
    /// `grace`. The check and the removal happen under one lock so that a
    /// concurrent touch either wins entirely or loses entirely.
    pub(crate) fn evict_if_expired(
        &self,
        session_id: &SessionId,
        grace: Duration,
        now: Instant,
    ) -> Option<UserId> {
        let slot = self.slot(session_id)?;

        let subscriptions = {
            let mut state = slot.state.lock();
            if state.closed || state.presence != PresenceState::PendingEviction {
                return None;
            }
            match state.pending_since {
                Some(since) if now.saturating_duration_since(since) >= grace => {}
                _ => return None,
            }
            state.closed = true;
            std::mem::take(&mut state.subscriptions)
        };

        self.finish_removal(&slot, subscriptions);
        Some(slot.user_id.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of distinct users with at least one live session.
    pub fn user_count(&self) -> usize {
        self.user_sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn sessions_for_user(&self, user_id: &UserId) -> Vec<SessionId> {
        self.user_sessions
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_user_online(&self, user_id: &UserId) -> bool {
        self.user_sessions
            .get(user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    fn slot(&self, session_id: &SessionId) -> Option<Arc<SessionSlot>> {
        self.sessions.get(session_id).map(|slot| Arc::clone(&slot))
    }

    /// Bounded lock acquisition: one retry, then `Busy`.
    fn lock_state<'a>(&self, slot: &'a SessionSlot) -> Result<MutexGuard<'a, SlotState>, HubError> {
        for attempt in 1..=2 {
            if let Some(guard) = slot.state.try_lock_for(self.lock_timeout) {
                return Ok(guard);
            }
            tracing::debug!(session_id = %slot.id, attempt, "Session lock contended");
        }
        Err(HubError::Busy(format!("session {}", slot.id)))
    }

    /// Second half of removal, after the slot is marked closed.
    fn finish_removal(&self, slot: &SessionSlot, subscriptions: HashSet<ChannelId>) {
        // Channels first, then the registry entry.
        for channel_id in &subscriptions {
            self.rooms.remove_subscriber(channel_id, &slot.id);
        }

        self.sessions.remove(&slot.id);

        if let Some(mut ids) = self.user_sessions.get_mut(&slot.user_id) {
            ids.remove(&slot.id);
        }
        self.user_sessions
            .remove_if(&slot.user_id, |_, ids| ids.is_empty());

        self.update_gauges();
    }

    fn update_gauges(&self) {
        metrics::set_hub_gauges(self.sessions.len(), self.rooms.channel_count());
    }
}
