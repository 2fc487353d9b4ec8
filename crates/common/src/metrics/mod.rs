//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all SalesTrackr metrics
pub const METRICS_PREFIX: &str = "salestrackr";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
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

    // Auth metrics
    describe_counter!(
        format!("{}_logins_total", METRICS_PREFIX),
        Unit::Count,
        "Total login attempts"
    );

    describe_counter!(
        format!("{}_registrations_total", METRICS_PREFIX),
        Unit::Count,
        "Total user registrations"
    );

    describe_counter!(
        format!("{}_sessions_revoked_total", METRICS_PREFIX),
        Unit::Count,
        "Total sessions destroyed by logout or invalidation"
    );

    // Visit metrics
    describe_counter!(
        format!("{}_check_ins_total", METRICS_PREFIX),
        Unit::Count,
        "Total visit check-ins"
    );

    describe_counter!(
        format!("{}_check_outs_total", METRICS_PREFIX),
        Unit::Count,
        "Total visit check-outs"
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

/// Record a login attempt
pub fn record_login(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        format!("{}_logins_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a registration
pub fn record_registration() {
    counter!(format!("{}_registrations_total", METRICS_PREFIX)).increment(1);
}

/// Record a session destroyed by logout or invalidation
pub fn record_session_revoked(reason: &str) {
    counter!(
        format!("{}_sessions_revoked_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a visit check-in
pub fn record_check_in() {
    counter!(format!("{}_check_ins_total", METRICS_PREFIX)).increment(1);
}

/// Record a visit check-out
pub fn record_check_out() {
    counter!(format!("{}_check_outs_total", METRICS_PREFIX)).increment(1);
}
