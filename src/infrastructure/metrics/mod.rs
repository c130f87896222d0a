//! Prometheus Metrics Module
//!
//! Provides hub-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active session and channel gauges
//! - Publish counts and fan-out latency histogram
//! - Delivery counts by outcome
//! - Eviction counts

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Live sessions in the connection registry
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("sessions_active", "Number of live sessions").namespace("chat_hub"),
    )
    .expect("Failed to create SESSIONS_ACTIVE metric")
});

/// Channels known to the room index
pub static CHANNELS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("channels_active", "Number of channels in the room index").namespace("chat_hub"),
    )
    .expect("Failed to create CHANNELS_ACTIVE metric")
});

/// Accepted publishes
pub static PUBLISHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("publishes_total", "Total number of accepted publishes").namespace("chat_hub"),
    )
    .expect("Failed to create PUBLISHES_TOTAL metric")
});

/// Per-target deliveries by outcome
pub static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deliveries_total", "Total number of per-target delivery attempts")
            .namespace("chat_hub"),
        &["outcome"], // "delivered", "skipped_not_subscribed", "failed_transport"
    )
    .expect("Failed to create DELIVERIES_TOTAL metric")
});

/// Sessions removed by the presence monitor
pub static EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("evictions_total", "Total number of evicted sessions").namespace("chat_hub"),
    )
    .expect("Failed to create EVICTIONS_TOTAL metric")
});

/// Fan-out latency histogram, from sequence assignment to the last result
pub static FANOUT_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let buckets = vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
    Histogram::with_opts(
        HistogramOpts::new("fanout_duration_seconds", "Publish fan-out latency in seconds")
            .namespace("chat_hub")
            .buckets(buckets),
    )
    .expect("Failed to create FANOUT_DURATION_SECONDS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(SESSIONS_ACTIVE.clone()))
        .expect("Failed to register SESSIONS_ACTIVE");
    registry
        .register(Box::new(CHANNELS_ACTIVE.clone()))
        .expect("Failed to register CHANNELS_ACTIVE");
    registry
        .register(Box::new(PUBLISHES_TOTAL.clone()))
        .expect("Failed to register PUBLISHES_TOTAL");
    registry
        .register(Box::new(DELIVERIES_TOTAL.clone()))
        .expect("Failed to register DELIVERIES_TOTAL");
    registry
        .register(Box::new(EVICTIONS_TOTAL.clone()))
        .expect("Failed to register EVICTIONS_TOTAL");
    registry
        .register(Box::new(FANOUT_DURATION_SECONDS.clone()))
        .expect("Failed to register FANOUT_DURATION_SECONDS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a completed publish
pub fn record_publish(delivered: usize, skipped: usize, failed: usize, duration_secs: f64) {
    PUBLISHES_TOTAL.inc();
    DELIVERIES_TOTAL
        .with_label_values(&["delivered"])
        .inc_by(delivered as u64);
    DELIVERIES_TOTAL
        .with_label_values(&["skipped_not_subscribed"])
        .inc_by(skipped as u64);
    DELIVERIES_TOTAL
        .with_label_values(&["failed_transport"])
        .inc_by(failed as u64);
    FANOUT_DURATION_SECONDS.observe(duration_secs);
}

/// Record an eviction
pub fn record_eviction() {
    EVICTIONS_TOTAL.inc();
}

/// Update the registry and index gauges
pub fn set_hub_gauges(sessions: usize, channels: usize) {
    SESSIONS_ACTIVE.set(sessions as i64);
    CHANNELS_ACTIVE.set(channels as i64);
}
