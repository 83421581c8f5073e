//! Prometheus metrics for parrot-capture.
//!
//! Tracks capture volume, self-traffic filtering, and replay outcomes.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Total number of requests observed by the correlator
    pub static ref REQUESTS_OBSERVED_TOTAL: CounterVec = register_counter_vec!(
        "parrot_requests_observed_total",
        "Total number of requests observed by the capture correlator",
        &["source"]  // source: network-intercept|page-xhr|page-fetch
    )
    .unwrap();

    /// Total number of requests dropped as self-originated
    pub static ref SELF_FILTERED_TOTAL: CounterVec = register_counter_vec!(
        "parrot_self_filtered_total",
        "Total number of requests dropped by the self-traffic filter",
        &["channel"]  // channel: network|relay
    )
    .unwrap();

    /// Total number of replays by outcome
    pub static ref REPLAYS_TOTAL: CounterVec = register_counter_vec!(
        "parrot_replays_total",
        "Total number of replay attempts by outcome",
        &["outcome"]  // outcome: success|failure
    )
    .unwrap();

    /// Replay round-trip duration
    pub static ref REPLAY_DURATION_MS: HistogramVec = register_histogram_vec!(
        "parrot_replay_duration_ms",
        "Histogram of replay round-trip time in milliseconds",
        &["method"],
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();

    /// Events ignored by the correlator
    pub static ref EVENTS_IGNORED_TOTAL: CounterVec = register_counter_vec!(
        "parrot_events_ignored_total",
        "Total number of capture events ignored by the correlator",
        &["reason"]  // reason: unknown_id|duplicate_id|relay_decode
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Helper to record an observed capture
pub fn record_request_observed(source: &str) {
    REQUESTS_OBSERVED_TOTAL.with_label_values(&[source]).inc();
}

/// Helper to record a self-filtered request
pub fn record_self_filtered(channel: &str) {
    SELF_FILTERED_TOTAL.with_label_values(&[channel]).inc();
}

/// Helper to record a replay outcome
pub fn record_replay_outcome(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    REPLAYS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record replay round-trip duration
pub fn record_replay_duration(method: &str, duration_ms: f64) {
    REPLAY_DURATION_MS
        .with_label_values(&[method])
        .observe(duration_ms);
}

/// Helper to record an ignored capture event
pub fn record_ignored_event(reason: &str) {
    EVENTS_IGNORED_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_request_observed("network-intercept");
        record_self_filtered("network");
        record_replay_outcome(true);
        record_replay_duration("POST", 120.0);

        let metrics = collect_metrics();

        assert!(metrics.contains("parrot_requests_observed_total"));
        assert!(metrics.contains("parrot_self_filtered_total"));
        assert!(metrics.contains("parrot_replays_total"));
        assert!(metrics.contains("parrot_replay_duration_ms"));
    }

    #[test]
    fn test_ignored_event_reasons() {
        record_ignored_event("unknown_id");
        record_ignored_event("duplicate_id");
        record_ignored_event("relay_decode");

        let metrics = collect_metrics();
        assert!(metrics.contains("parrot_events_ignored_total"));
    }

    #[test]
    fn test_replay_outcome_labels() {
        record_replay_outcome(true);
        record_replay_outcome(false);

        let metrics = collect_metrics();
        assert!(metrics.contains("parrot_replays_total"));
    }
}
