//! Prometheus Metrics Module
//!
//! Channel health metrics using Prometheus.
//!
//! # Metrics Collected
//! - Connection attempts by channel
//! - Scheduled reconnects by channel
//! - Inbound messages by channel and type tag
//! - Missed heartbeats by channel
//! - Current connection state by channel

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::domain::ConnectionState;

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Socket creation attempts
pub static CONNECTION_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("connection_attempts_total", "Total number of socket creation attempts")
            .namespace("chat_realtime"),
        &["channel"],
    )
    .expect("Failed to create CONNECTION_ATTEMPTS_TOTAL metric")
});

/// Reconnects scheduled after a failure
pub static RECONNECTS_SCHEDULED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reconnects_scheduled_total", "Total number of scheduled reconnects")
            .namespace("chat_realtime"),
        &["channel"],
    )
    .expect("Failed to create RECONNECTS_SCHEDULED_TOTAL metric")
});

/// Inbound messages by type tag
pub static MESSAGES_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_received_total", "Total number of inbound messages")
            .namespace("chat_realtime"),
        &["channel", "type"],
    )
    .expect("Failed to create MESSAGES_RECEIVED_TOTAL metric")
});

/// Heartbeat ticks that found the previous ping unanswered
pub static HEARTBEATS_MISSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("heartbeats_missed_total", "Total number of unanswered pings")
            .namespace("chat_realtime"),
        &["channel"],
    )
    .expect("Failed to create HEARTBEATS_MISSED_TOTAL metric")
});

/// One-hot connection state gauge
pub static CONNECTION_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("connection_state", "Current connection state (1 = active state)")
            .namespace("chat_realtime"),
        &["channel", "state"],
    )
    .expect("Failed to create CONNECTION_STATE metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(CONNECTION_ATTEMPTS_TOTAL.clone()))
        .expect("Failed to register CONNECTION_ATTEMPTS_TOTAL");
    registry
        .register(Box::new(RECONNECTS_SCHEDULED_TOTAL.clone()))
        .expect("Failed to register RECONNECTS_SCHEDULED_TOTAL");
    registry
        .register(Box::new(MESSAGES_RECEIVED_TOTAL.clone()))
        .expect("Failed to register MESSAGES_RECEIVED_TOTAL");
    registry
        .register(Box::new(HEARTBEATS_MISSED_TOTAL.clone()))
        .expect("Failed to register HEARTBEATS_MISSED_TOTAL");
    registry
        .register(Box::new(CONNECTION_STATE.clone()))
        .expect("Failed to register CONNECTION_STATE");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_connection_attempt(channel: &str) {
    CONNECTION_ATTEMPTS_TOTAL.with_label_values(&[channel]).inc();
}

pub fn record_reconnect_scheduled(channel: &str) {
    RECONNECTS_SCHEDULED_TOTAL.with_label_values(&[channel]).inc();
}

pub fn record_message(channel: &str, kind: &str) {
    MESSAGES_RECEIVED_TOTAL.with_label_values(&[channel, kind]).inc();
}

pub fn record_heartbeat_missed(channel: &str) {
    HEARTBEATS_MISSED_TOTAL.with_label_values(&[channel]).inc();
}

/// Helper to flip the one-hot state gauge
pub fn set_connection_state(channel: &str, state: ConnectionState) {
    for candidate in ConnectionState::ALL {
        CONNECTION_STATE
            .with_label_values(&[channel, candidate.as_str()])
            .set(i64::from(candidate == state));
    }
}
