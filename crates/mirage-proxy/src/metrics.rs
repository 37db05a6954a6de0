//! Prometheus metrics for the capture pipeline and mock registry.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tracing::error;

lazy_static! {
    /// Completed exchanges by outcome
    pub static ref EXCHANGES_TOTAL: CounterVec = register_counter_vec!(
        "mirage_exchanges_total",
        "Total number of exchanges completed by the capture pipeline",
        &["endpoint", "protocol", "status"]  // status: success|failed|mocked
    )
    .unwrap();

    /// Liveness probes dropped by the health-check filter
    pub static ref FILTERED_PROBES_TOTAL: CounterVec = register_counter_vec!(
        "mirage_filtered_probes_total",
        "Total number of health-check queries dropped before capture",
        &["endpoint"]
    )
    .unwrap();

    /// Upstream round-trip duration
    pub static ref UPSTREAM_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mirage_upstream_duration_ms",
        "Duration of forwarded exchanges in milliseconds",
        &["endpoint", "result"],  // result: ok|error
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Drift detections against stored mocks
    pub static ref DRIFT_DETECTED_TOTAL: CounterVec = register_counter_vec!(
        "mirage_drift_detected_total",
        "Total number of responses found to differ from a stored mock",
        &["endpoint", "replaced"]  // replaced: true|false
    )
    .unwrap();

    /// Mock mutations
    pub static ref MOCK_MUTATIONS_TOTAL: CounterVec = register_counter_vec!(
        "mirage_mock_mutations_total",
        "Total number of mock mutations",
        &["endpoint", "operation"]  // operation: add|auto_create|update|toggle|remove|replace
    )
    .unwrap();

    /// Active client connections
    pub static ref ACTIVE_CONNECTIONS: GaugeVec = register_gauge_vec!(
        "mirage_active_connections",
        "Number of client connections currently open",
        &["endpoint"]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_exchange(endpoint: u16, protocol: &str, status: &str) {
    EXCHANGES_TOTAL
        .with_label_values(&[&endpoint.to_string(), protocol, status])
        .inc();
}

pub fn record_filtered_probe(endpoint: u16) {
    FILTERED_PROBES_TOTAL
        .with_label_values(&[&endpoint.to_string()])
        .inc();
}

pub fn record_upstream(endpoint: u16, duration_ms: u64, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    UPSTREAM_DURATION_MS
        .with_label_values(&[&endpoint.to_string(), result])
        .observe(duration_ms as f64);
}

pub fn record_drift(endpoint: u16, replaced: bool) {
    DRIFT_DETECTED_TOTAL
        .with_label_values(&[&endpoint.to_string(), if replaced { "true" } else { "false" }])
        .inc();
}

pub fn record_mock_mutation(endpoint: u16, operation: &str) {
    MOCK_MUTATIONS_TOTAL
        .with_label_values(&[&endpoint.to_string(), operation])
        .inc();
}

pub fn connection_opened(endpoint: u16) {
    ACTIVE_CONNECTIONS
        .with_label_values(&[&endpoint.to_string()])
        .inc();
}

pub fn connection_closed(endpoint: u16) {
    ACTIVE_CONNECTIONS
        .with_label_values(&[&endpoint.to_string()])
        .dec();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_exported() {
        record_exchange(65001, "postgres", "mocked");
        record_filtered_probe(65001);
        record_upstream(65001, 12, true);
        record_drift(65001, false);
        record_mock_mutation(65001, "add");

        let text = collect_metrics();
        assert!(text.contains("mirage_exchanges_total"));
        assert!(text.contains("mirage_filtered_probes_total"));
        assert!(text.contains("mirage_upstream_duration_ms"));
        assert!(text.contains("mirage_drift_detected_total"));
        assert!(text.contains("mirage_mock_mutations_total"));
    }

    #[test]
    fn test_exchange_counter_increments() {
        let before = EXCHANGES_TOTAL
            .with_label_values(&["65002", "http", "success"])
            .get();
        record_exchange(65002, "http", "success");
        let after = EXCHANGES_TOTAL
            .with_label_values(&["65002", "http", "success"])
            .get();
        assert_eq!(after - before, 1.0);
    }
}
