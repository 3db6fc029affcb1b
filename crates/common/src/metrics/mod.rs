//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram, Unit,
};
use std::time::{Duration, Instant};

/// Metrics prefix for all Commentree metrics
pub const METRICS_PREFIX: &str = "commentree";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Database metrics
    describe_counter!(
        format!("{}_db_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Store operations by outcome (ok, error, exhausted, cancelled)"
    );

    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Latency of a single statement attempt in seconds"
    );

    describe_counter!(
        format!("{}_db_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retries after transient database failures"
    );

    // Search metrics
    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from search"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record the final outcome of a store operation
pub fn record_db_operation(operation: &'static str, outcome: &'static str, elapsed: Option<Duration>) {
    counter!(
        format!("{}_db_operations_total", METRICS_PREFIX),
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);

    if let Some(elapsed) = elapsed {
        histogram!(
            format!("{}_db_query_duration_seconds", METRICS_PREFIX),
            "operation" => operation
        )
        .record(elapsed.as_secs_f64());
    }
}

pub fn record_db_retry(operation: &'static str) {
    counter!(
        format!("{}_db_retries_total", METRICS_PREFIX),
        "operation" => operation
    )
    .increment(1);
}

/// Helper to record search metrics
pub fn record_search(result_count: usize) {
    gauge!(format!("{}_search_results_count", METRICS_PREFIX)).set(result_count as f64);
}
