//! Prometheus metrics for the conversion engine.
//!
//! This module provides metrics for:
//! - Conversions (results, duration per tool)
//! - Scheduler (queued and running jobs)
//! - Workspaces (stale entries swept)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Conversions
// =============================================================================

/// Finished jobs by result. Timeouts are failures, kept apart from
/// caller cancellations.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("filemorph_conversions_total", "Total finished conversion jobs"),
        &["result"], // "succeeded", "failed", "timeout", "cancelled"
    )
    .unwrap()
});

/// Time spent in a job once it held a slot.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "filemorph_conversion_duration_seconds",
            "Duration of conversion jobs from slot acquisition to result",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["tool"],
    )
    .unwrap()
});

// =============================================================================
// Scheduler
// =============================================================================

/// Jobs waiting for a slot.
pub static JOBS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("filemorph_jobs_queued", "Jobs waiting for an execution slot").unwrap()
});

/// Jobs holding a slot.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("filemorph_jobs_running", "Jobs holding an execution slot").unwrap()
});

// =============================================================================
// Workspaces
// =============================================================================

pub static WORKSPACE_SWEEPS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "filemorph_workspace_sweeps_total",
        "Stale workspaces and outputs removed from the scratch root",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(JOBS_QUEUED.clone()),
        Box::new(JOBS_RUNNING.clone()),
        Box::new(WORKSPACE_SWEEPS.clone()),
    ]
}
