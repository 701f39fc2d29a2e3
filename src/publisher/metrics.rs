//! Prometheus metrics for reliable publishing

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

/// Publisher metrics
pub struct PublisherMetrics {
    /// Publish attempts by outcome (acked, rejected, timed_out, unreachable, error)
    pub attempts: CounterVec,

    /// Retries issued by the supervisor
    pub retries: CounterVec,

    /// Messages handed to the escalation path
    pub escalations: CounterVec,

    /// Records currently waiting in the retry registry
    pub registry_size: Gauge,

    /// Time from publish to confirmation
    pub confirm_latency: HistogramVec,
}

lazy_static! {
    pub static ref PUBLISHER_METRICS: PublisherMetrics = PublisherMetrics {
        attempts: register_counter_vec!(
            "eol_publisher_attempts_total",
            "Total number of publish attempts",
            &["routing_key", "outcome"]
        )
        .unwrap(),

        retries: register_counter_vec!(
            "eol_publisher_retries_total",
            "Total number of publish retries",
            &["routing_key"]
        )
        .unwrap(),

        escalations: register_counter_vec!(
            "eol_publisher_escalations_total",
            "Total number of messages escalated as undeliverable",
            &["routing_key"]
        )
        .unwrap(),

        registry_size: register_gauge!(
            "eol_publisher_registry_size",
            "Number of messages waiting for retry"
        )
        .unwrap(),

        confirm_latency: register_histogram_vec!(
            "eol_publisher_confirm_latency_seconds",
            "Publish confirmation latency in seconds",
            &["routing_key"]
        )
        .unwrap(),
    };
}

/// Initialize publisher metrics
pub fn init_publisher_metrics() {
    lazy_static::initialize(&PUBLISHER_METRICS);
}

/// Render the default registry in the Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
