//! Prometheus metrics for push runs
//!
//! This module provides metrics tracking for:
//! - Push runs by mode (interactive, scheduled) and outcome
//! - Individual deliveries by result
//! - Whether a run is currently in flight, and how long runs take
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! Until then (or if initialization fails) every recording call is a no-op.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct PushMetrics {
    runs: CounterVec,
    deliveries: CounterVec,
    in_flight: Gauge,
    run_duration: HistogramVec,
}

static PUSH_METRICS: OnceLock<PushMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; later calls do nothing.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = herald::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics disabled");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PushMetrics {
        runs: register_counter_vec!(
            "herald_push_runs_total",
            "Push runs started, by mode and outcome",
            &["mode", "outcome"]
        )?,
        deliveries: register_counter_vec!(
            "herald_push_deliveries_total",
            "Delivery attempts by result",
            &["result"]
        )?,
        in_flight: register_gauge!(
            "herald_push_in_flight",
            "Whether a push run is in progress (1 = yes, 0 = no)"
        )?,
        run_duration: register_histogram_vec!(
            "herald_push_run_duration_seconds",
            "Wall-clock duration of completed push runs",
            &["mode"],
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]
        )?,
    };

    PUSH_METRICS
        .set(metrics)
        .map_err(|_| "Push metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PUSH_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of a push invocation
pub fn record_push_run(mode: &str, outcome: &str) {
    if let Some(m) = PUSH_METRICS.get() {
        m.runs.with_label_values(&[mode, outcome]).inc();
    }
}

/// Record one delivery attempt
pub fn record_delivery(success: bool) {
    let Some(m) = PUSH_METRICS.get() else {
        return;
    };
    let result = if success { "success" } else { "failure" };
    m.deliveries.with_label_values(&[result]).inc();
}

/// Record the duration of a completed run
pub fn observe_run_duration(mode: &str, secs: f64) {
    if let Some(m) = PUSH_METRICS.get() {
        m.run_duration.with_label_values(&[mode]).observe(secs);
    }
}

/// Marks a run in flight until dropped
pub struct InFlightGuard {
    active: bool,
}

impl InFlightGuard {
    /// Set the in-flight gauge
    pub fn enter() -> Self {
        match PUSH_METRICS.get() {
            Some(m) => {
                m.in_flight.set(1.0);
                Self { active: true }
            }
            None => Self { active: false },
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(m) = PUSH_METRICS.get() {
            m.in_flight.set(0.0);
        }
    }
}
