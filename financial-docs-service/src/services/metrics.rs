//! Prometheus metrics for financial-docs-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// HTTP request counter by route and status code.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "findocs_http_requests_total",
        "Total number of HTTP requests",
        &["route", "status"]
    )
    .expect("Failed to register http_requests_total")
});

/// HTTP request duration histogram by route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "findocs_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["route"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register http_request_duration")
});

/// Autosave attempts by outcome.
pub static SAVES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "findocs_saves_total",
        "Total number of document save attempts by outcome",
        &["outcome"] // saved, skipped, failed
    )
    .expect("Failed to register saves_total")
});

/// Save duration histogram.
pub static SAVE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "findocs_save_duration_seconds",
        "Document save duration in seconds",
        &["outcome"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register save_duration")
});

/// Local backup writes by outcome.
pub static BACKUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "findocs_backups_total",
        "Total number of local backup writes by outcome",
        &["outcome"]
    )
    .expect("Failed to register backups_total")
});

/// Status transitions by document kind and target status.
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "findocs_status_transitions_total",
        "Total number of status transitions",
        &["kind", "status"]
    )
    .expect("Failed to register status_transitions_total")
});

/// Send-to-client notifications by outcome.
pub static NOTIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "findocs_notifications_total",
        "Total number of client notifications by outcome",
        &["outcome"]
    )
    .expect("Failed to register notifications_total")
});

/// PDF exports by kind and outcome.
pub static EXPORTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "findocs_exports_total",
        "Total number of PDF exports",
        &["kind", "outcome"]
    )
    .expect("Failed to register exports_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&SAVES_TOTAL);
    Lazy::force(&SAVE_DURATION);
    Lazy::force(&BACKUPS_TOTAL);
    Lazy::force(&TRANSITIONS_TOTAL);
    Lazy::force(&NOTIFICATIONS_TOTAL);
    Lazy::force(&EXPORTS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
