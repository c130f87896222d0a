//! Message Fanout Engine
//!
//! Validates a publish, assigns the channel's next sequence number, hands
//! the message to the store and delivers it to every subscriber in the
//! channel snapshot. Targets are delivered independently: a failing or slow
//! target only affects its own [`DeliveryResult`].

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::connection_registry::ConnectionRegistry;
use super::events::{EventBus, HubEvent};
use super::presence_monitor::PresenceMonitor;
use crate::config::HubSettings;
use crate::domain::{
    ChannelId, Delivery, DeliveryError, DeliveryResult, Message, MessageStore, PublishReport,
    SessionId,
};
use crate::infrastructure::metrics;
use crate::shared::error::HubError;

/// Running totals across all publishes.
#[derive(Debug, Default)]
pub struct FanoutCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl FanoutCounters {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Publish pipeline. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct FanoutEngine {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceMonitor>,
    store: Arc<dyn MessageStore>,
    events: EventBus,
    counters: Arc<FanoutCounters>,
    max_payload: usize,
    delivery_timeout: Duration,
    concurrency: usize,
    echo_to_sender: bool,
}

impl FanoutEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceMonitor>,
        store: Arc<dyn MessageStore>,
        events: EventBus,
        settings: &HubSettings,
    ) -> Self {
        Self {
            registry,
            presence,
            store,
            events,
            counters: Arc::new(FanoutCounters::default()),
            max_payload: settings.max_payload_bytes,
            delivery_timeout: settings.delivery_timeout(),
            concurrency: settings.fanout_concurrency.max(1),
            echo_to_sender: settings.echo_to_sender,
        }
    }

    pub fn counters(&self) -> &FanoutCounters {
        &self.counters
    }

    /// Last sequence number assigned on a channel (0 if none).
    pub fn last_sequence(&self, channel_id: &ChannelId) -> u64 {
        self.registry.rooms().last_sequence(channel_id)
    }

    /// Publish `payload` from `sender` to every other subscriber of
    /// `channel_id`.
    ///
    /// Validation failures (`PayloadTooLarge`, unknown sender, unknown
    /// channel) are returned before any state changes. Once validation passes the publish runs on
    /// its own task, so dropping the caller's future (for example because
    /// the publisher disconnected) does not cut the fan-out short.
    pub async fn publish(
        &self,
        sender: &SessionId,
        channel_id: &ChannelId,
        payload: Vec<u8>,
    ) -> Result<PublishReport, HubError> {
        if payload.len() > self.max_payload {
            tracing::debug!(
                session_id = %sender,
                channel_id = %channel_id,
                size = payload.len(),
                max = self.max_payload,
                "Rejected oversized payload"
            );
            return Err(HubError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        let sender_user = self.registry.user_of(sender)?;
        let counter = self
            .registry
            .rooms()
            .sequence_counter(channel_id)
            .ok_or_else(|| HubError::ChannelNotFound(channel_id.clone()))?;

        let engine = self.clone();
        let sender = sender.clone();
        let channel_id = channel_id.clone();
        let task = tokio::spawn(async move {
            let sequence = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let message = Arc::new(Message {
                sender,
                sender_user,
                channel_id,
                payload: Arc::from(payload),
                sequence,
                published_at: Utc::now(),
            });
            engine.run(message).await
        });

        task.await
            .map_err(|e| HubError::Internal(format!("fan-out task failed: {}", e)))
    }

    async fn run(&self, message: Arc<Message>) -> PublishReport {
        let started = Instant::now();

        if let Err(e) = self.store.append(&message).await {
            // Persistence is best effort; delivery proceeds regardless.
            tracing::warn!(
                channel_id = %message.channel_id,
                sequence = message.sequence,
                error = %e,
                "Message store append failed"
            );
        }

        let mut targets: Vec<SessionId> = self
            .registry
            .rooms()
            .subscribers(&message.channel_id)
            .into_iter()
            .filter(|target| self.echo_to_sender || *target != message.sender)
            .collect();
        targets.sort();

        let mut results: Vec<DeliveryResult> = stream::iter(targets)
            .map(|target| self.deliver_one(target, Arc::clone(&message)))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.session_id.cmp(&b.session_id));

        let report = PublishReport {
            channel_id: message.channel_id.clone(),
            sequence: message.sequence,
            results,
        };
        self.record(&report, started.elapsed());
        report
    }

    async fn deliver_one(&self, target: SessionId, message: Arc<Message>) -> DeliveryResult {
        let handle = match self.registry.delivery_target(&target, &message.channel_id) {
            Ok(Some(handle)) => handle,
            Ok(None) => return DeliveryResult::skipped(target),
            Err(e) => return DeliveryResult::failed(target, e),
        };

        let delivery = Delivery::new(target.clone(), message);
        let attempt = tokio::time::timeout(
            self.delivery_timeout,
            handle.deliver(&delivery, self.delivery_timeout),
        )
        .await;

        match attempt {
            Ok(Ok(())) => DeliveryResult::delivered(target),
            Ok(Err(DeliveryError::Timeout(elapsed))) => {
                self.on_timeout(&target);
                DeliveryResult::failed(target, DeliveryError::Timeout(elapsed))
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    session_id = %target,
                    channel_id = %delivery.channel_id(),
                    sequence = delivery.sequence(),
                    error = %e,
                    "Delivery failed"
                );
                DeliveryResult::failed(target, e)
            }
            Err(_) => {
                self.on_timeout(&target);
                DeliveryResult::failed(target, DeliveryError::Timeout(self.delivery_timeout))
            }
        }
    }

    fn on_timeout(&self, target: &SessionId) {
        tracing::warn!(
            session_id = %target,
            timeout_ms = self.delivery_timeout.as_millis() as u64,
            "Delivery timed out"
        );
        self.presence.recheck(target);
    }

    fn record(&self, report: &PublishReport, elapsed: Duration) {
        let delivered = report.delivered_count();
        let skipped = report.skipped_count();
        let failed = report.failed_count();

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.counters
            .skipped
            .fetch_add(skipped as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(failed as u64, Ordering::Relaxed);
        metrics::record_publish(delivered, skipped, failed, elapsed.as_secs_f64());

        tracing::info!(
            channel_id = %report.channel_id,
            sequence = report.sequence,
            delivered,
            skipped,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Publish completed"
        );

        self.events.emit(HubEvent::PublishCompleted {
            channel_id: report.channel_id.clone(),
            sequence: report.sequence,
            delivered,
            failed,
        });
    }
}
