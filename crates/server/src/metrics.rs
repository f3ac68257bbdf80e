//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the filemorph server:
//! - HTTP request metrics (latency, counts, errors)
//! - Upload sizes
//! - Slot pool status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "filemorph_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("filemorph_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "filemorph_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Size of accepted uploads.
pub static UPLOAD_BYTES: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("filemorph_upload_bytes", "Size of accepted uploads in bytes").buckets(
            vec![
                1024.0,
                64.0 * 1024.0,
                1024.0 * 1024.0,
                8.0 * 1024.0 * 1024.0,
                32.0 * 1024.0 * 1024.0,
                128.0 * 1024.0 * 1024.0,
            ],
        ),
    )
    .unwrap()
});

/// Conversions rejected before a job was created, by failure kind.
pub static CONVERSIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "filemorph_conversions_rejected_total",
            "Conversion requests rejected before queueing",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Pool Metrics (collected dynamically)
// =============================================================================

/// Configured number of execution slots.
pub static POOL_SLOTS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("filemorph_pool_slots", "Number of execution slots").unwrap()
});

/// Highest number of slots ever in use at once.
pub static POOL_PEAK_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "filemorph_pool_peak_active",
        "Highest number of jobs that held a slot at the same time",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry.register(Box::new(UPLOAD_BYTES.clone())).unwrap();
    registry
        .register(Box::new(CONVERSIONS_REJECTED.clone()))
        .unwrap();

    // Pool
    registry.register(Box::new(POOL_SLOTS.clone())).unwrap();
    registry
        .register(Box::new(POOL_PEAK_ACTIVE.clone()))
        .unwrap();

    // Core metrics (jobs, tools, scratch root)
    for metric in filemorph_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the pool gauges reflect the scheduler.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().pool_status();
    POOL_SLOTS.set(status.max_concurrent as i64);
    POOL_PEAK_ACTIVE.set(status.peak_active as i64);
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{12}",
    )
    .unwrap();
    uuid_regex.replace_all(path, "{id}").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_job_id() {
        let path = "/api/v1/jobs/550e8400e29b41d4a716446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_hyphenated_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/formats";
        assert_eq!(normalize_path(path), "/api/v1/formats");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("filemorph_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs vector metrics that have a label set.
        filemorph_core::metrics::CONVERSIONS_TOTAL
            .with_label_values(&["succeeded"])
            .inc_by(0);
        POOL_SLOTS.set(2);

        let output = encode_metrics();
        assert!(output.contains("filemorph_conversions_total"));
        assert!(output.contains("filemorph_jobs_queued"));
        assert!(output.contains("filemorph_jobs_running"));
        assert!(output.contains("filemorph_workspace_sweeps_total"));
        assert!(output.contains("filemorph_pool_slots"));
    }
}
