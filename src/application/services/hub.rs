//! Hub
//!
//! Entry point for transports. Wires the registry, room index, fan-out
//! engine and presence monitor together and owns their lifecycle.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::connection_registry::ConnectionRegistry;
use super::events::{EventBus, HubEvent};
use super::fanout_engine::FanoutEngine;
use super::presence_monitor::PresenceMonitor;
use super::room_index::RoomIndex;
use crate::config::HubSettings;
use crate::domain::{
    Channel, ChannelId, ClientFrame, ConnectionHandle, FrameOutcome, MessageStore, PublishReport,
    Session, SessionId, UserId,
};
use crate::infrastructure::store::NoopMessageStore;
use crate::shared::error::HubError;

/// Point-in-time counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub sessions: usize,
    pub users: usize,
    pub channels: usize,
    pub messages_published: u64,
    pub deliveries_delivered: u64,
    pub deliveries_failed: u64,
    pub deliveries_skipped: u64,
    pub evictions: u64,
}

/// Connection registry + message fan-out hub.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    fanout: FanoutEngine,
    presence: Arc<PresenceMonitor>,
    events: EventBus,
    settings: HubSettings,
    /// Admission gate. Registration holds the read side; shutdown takes the
    /// write side to close it, so no register can land after the drain.
    accepting: RwLock<bool>,
    shutdown_tx: watch::Sender<bool>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    /// Hub that does not persist messages.
    pub fn new(settings: HubSettings) -> Self {
        Self::with_store(settings, Arc::new(NoopMessageStore))
    }

    pub fn with_store(settings: HubSettings, store: Arc<dyn MessageStore>) -> Self {
        let rooms = Arc::new(RoomIndex::new(settings.channel_retention));
        let registry = Arc::new(ConnectionRegistry::new(
            rooms,
            settings.session_policy,
            settings.lock_timeout(),
        ));
        let events = EventBus::new(settings.event_buffer);
        let presence = Arc::new(PresenceMonitor::new(
            Arc::clone(&registry),
            events.clone(),
            settings.heartbeat_timeout(),
            settings.eviction_grace(),
            settings.presence_sweep(),
        ));
        let fanout = FanoutEngine::new(
            Arc::clone(&registry),
            Arc::clone(&presence),
            store,
            events.clone(),
            &settings,
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            registry,
            fanout,
            presence,
            events,
            settings,
            accepting: RwLock::new(true),
            shutdown_tx,
            monitor_task: Mutex::new(None),
        }
    }

    /// Start the background presence monitor. Calling it again is a no-op.
    pub fn start(&self) {
        let mut task = self.monitor_task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(Arc::clone(&self.presence).spawn(self.shutdown_tx.subscribe()));
        tracing::info!(
            heartbeat_interval_ms = self.settings.heartbeat_interval_ms,
            eviction_grace_ms = self.settings.eviction_grace_ms,
            "Presence monitor started"
        );
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn presence(&self) -> &Arc<PresenceMonitor> {
        &self.presence
    }

    /// `false` once shutdown has begun.
    pub fn is_accepting(&self) -> bool {
        *self.accepting.read()
    }

    /// Whether the presence monitor task is running.
    pub fn is_monitoring(&self) -> bool {
        self.monitor_task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Interval advertised to clients in Hello. Shorter than the
    /// heartbeat timeout so an on-schedule client never looks idle.
    pub fn heartbeat_interval(&self) -> Duration {
        self.settings.advertised_heartbeat()
    }

    /// Register a newly authenticated connection.
    pub fn accept_connection(
        &self,
        user_id: UserId,
        handle: Arc<dyn ConnectionHandle>,
    ) -> Result<SessionId, HubError> {
        let session_id = {
            let accepting = self.accepting.read();
            if !*accepting {
                return Err(HubError::ShuttingDown);
            }
            self.registry.register(user_id.clone(), handle)?
        };
        self.events.emit(HubEvent::SessionRegistered {
            session_id: session_id.clone(),
            user_id,
        });
        Ok(session_id)
    }

    /// Apply one decoded client frame. Any frame counts as activity.
    pub async fn handle_client_frame(
        &self,
        session_id: &SessionId,
        frame: ClientFrame,
    ) -> Result<FrameOutcome, HubError> {
        self.registry.touch(session_id)?;

        match frame {
            ClientFrame::Subscribe(channel_id) => {
                self.subscribe(session_id, &channel_id)?;
                Ok(FrameOutcome::Subscribed(channel_id))
            }
            ClientFrame::Unsubscribe(channel_id) => {
                self.unsubscribe(session_id, &channel_id)?;
                Ok(FrameOutcome::Unsubscribed(channel_id))
            }
            ClientFrame::Publish {
                channel_id,
                payload,
            } => {
                let report = self.publish(session_id, &channel_id, payload).await?;
                Ok(FrameOutcome::Published(report))
            }
            ClientFrame::Heartbeat => Ok(FrameOutcome::HeartbeatAck),
        }
    }

    pub async fn publish(
        &self,
        sender: &SessionId,
        channel_id: &ChannelId,
        payload: Vec<u8>,
    ) -> Result<PublishReport, HubError> {
        self.fanout.publish(sender, channel_id, payload).await
    }

    pub fn subscribe(&self, session_id: &SessionId, channel_id: &ChannelId) -> Result<(), HubError> {
        self.registry.subscribe(session_id, channel_id).map(|_| ())
    }

    pub fn unsubscribe(
        &self,
        session_id: &SessionId,
        channel_id: &ChannelId,
    ) -> Result<(), HubError> {
        self.registry.unsubscribe(session_id, channel_id).map(|_| ())
    }

    /// Current subscribers of a channel. Empty for an unknown channel.
    pub fn subscribers(&self, channel_id: &ChannelId) -> HashSet<SessionId> {
        self.registry.rooms().subscribers(channel_id)
    }

    pub fn channel(&self, channel_id: &ChannelId) -> Result<Channel, HubError> {
        self.registry
            .rooms()
            .channel(channel_id)
            .ok_or_else(|| HubError::ChannelNotFound(channel_id.clone()))
    }

    pub fn lookup(&self, session_id: &SessionId) -> Result<Session, HubError> {
        self.registry.lookup(session_id)
    }

    pub fn touch(&self, session_id: &SessionId) -> Result<(), HubError> {
        self.registry.touch(session_id)
    }

    pub fn unregister(&self, session_id: &SessionId) -> bool {
        self.registry.unregister(session_id)
    }

    pub fn stats(&self) -> HubStats {
        let counters = self.fanout.counters();
        HubStats {
            sessions: self.registry.session_count(),
            users: self.registry.user_count(),
            channels: self.registry.rooms().channel_count(),
            messages_published: counters.published(),
            deliveries_delivered: counters.delivered(),
            deliveries_failed: counters.failed(),
            deliveries_skipped: counters.skipped(),
            evictions: self.presence.evictions(),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Stop accepting connections, stop the presence monitor and unregister
    /// every remaining session. Returns the number of sessions removed.
    pub async fn shutdown(&self) -> usize {
        *self.accepting.write() = false;
        let _ = self.shutdown_tx.send(true);

        let task = self.monitor_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Presence monitor exited abnormally");
            }
        }

        let mut removed = 0;
        loop {
            let remaining = self.registry.session_ids();
            if remaining.is_empty() {
                break;
            }
            for session_id in remaining {
                if self.registry.unregister(&session_id) {
                    removed += 1;
                }
            }
        }

        tracing::info!(sessions = removed, "Hub shut down");
        removed
    }
}
