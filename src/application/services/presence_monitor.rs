//! Presence & Heartbeat Monitor
//!
//! Two-phase eviction of silent sessions:
//!
//! ```text
//! Active --(heartbeat timeout, no touch)--> PendingEviction
//! PendingEviction --(touch)--> Active
//! PendingEviction --(grace period, no touch)--> Evicted (unregistered)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::connection_registry::ConnectionRegistry;
use super::events::{EventBus, HubEvent};
use crate::domain::SessionId;
use crate::infrastructure::metrics;

/// Result of one sweep over the registry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub demoted: Vec<SessionId>,
    pub evicted: Vec<SessionId>,
}

/// Heartbeat timeout tracker.
pub struct PresenceMonitor {
    registry: Arc<ConnectionRegistry>,
    events: EventBus,
    heartbeat_timeout: Duration,
    grace: Duration,
    sweep_every: Duration,
    evictions: AtomicU64,
}

impl PresenceMonitor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        events: EventBus,
        heartbeat_timeout: Duration,
        grace: Duration,
        sweep_every: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            heartbeat_timeout,
            grace,
            sweep_every,
            evictions: AtomicU64::new(0),
        }
    }

    /// Advance every session's presence state machine by one step.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();

        for session_id in self.registry.session_ids() {
            if let Some(user_id) = self.registry.evict_if_expired(&session_id, self.grace, now) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_eviction();
                tracing::info!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Session evicted after grace period"
                );
                self.events.emit(HubEvent::SessionEvicted {
                    session_id: session_id.clone(),
                    user_id,
                });
                report.evicted.push(session_id);
            } else if self.registry.demote(&session_id, self.heartbeat_timeout, now) {
                tracing::debug!(session_id = %session_id, "Heartbeat timeout, pending eviction");
                report.demoted.push(session_id);
            }
        }

        report
    }

    /// Re-check a session suspected dead (for example after a delivery
    /// timeout): it enters the grace period immediately instead of waiting
    /// for its heartbeat timeout.
    pub fn recheck(&self, session_id: &SessionId) -> bool {
        let demoted = self
            .registry
            .demote(session_id, Duration::ZERO, Instant::now());
        if demoted {
            tracing::debug!(session_id = %session_id, "Suspect session moved to pending eviction");
        }
        demoted
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Run sweeps on a fixed cadence until `shutdown` flips to `true`.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.sweep();
                        if !report.evicted.is_empty() {
                            tracing::debug!(evicted = report.evicted.len(), "Presence sweep evicted sessions");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Presence monitor stopped");
        })
    }
}
