//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until [`init_metrics`](super::init_metrics) has
//! run, so library users who never export metrics pay only an `OnceLock`
//! load per call.

use std::time::Duration;

use super::prometheus::{
    ACTIVE_STAGES, BUFFER_DEPTH, DELIVERIES_TOTAL, RUNS_TOTAL, RUN_DURATION, STAGE_UNITS_TOTAL,
};

/// Metrics collector for pipeline operations.
///
/// # Example
///
/// ```ignore
/// use boundline::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_unit("milk");
/// collector.record_delivery();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one unit produced by `stage`.
    pub fn record_unit(&self, stage: &str) {
        if let Some(units) = STAGE_UNITS_TOTAL.get() {
            units.with_label_values(&[stage]).inc();
        }
    }

    /// Record one completed delivery.
    pub fn record_delivery(&self) {
        if let Some(deliveries) = DELIVERIES_TOTAL.get() {
            deliveries.inc();
        }
        tracing::trace!("Recorded delivery metric");
    }

    /// Set the observed depth of the buffer filled by `buffer`.
    pub fn set_buffer_depth(&self, buffer: &str, depth: usize) {
        if let Some(gauge) = BUFFER_DEPTH.get() {
            gauge.with_label_values(&[buffer]).set(depth as f64);
        }
    }

    pub fn stage_started(&self) {
        if let Some(active) = ACTIVE_STAGES.get() {
            active.inc();
        }
    }

    pub fn stage_finished(&self) {
        if let Some(active) = ACTIVE_STAGES.get() {
            active.dec();
        }
    }

    /// Record the outcome of a whole run.
    ///
    /// # Arguments
    ///
    /// * `status` - Run outcome (e.g., "completed", "failed")
    /// * `duration` - Wall-clock run duration
    pub fn record_run(&self, status: &str, duration: Duration) {
        if let Some(runs) = RUNS_TOTAL.get() {
            runs.with_label_values(&[status]).inc();
        }
        if let Some(hist) = RUN_DURATION.get() {
            hist.with_label_values(&[status])
                .observe(duration.as_secs_f64());
        }

        tracing::trace!(
            status = status,
            duration_ms = duration.as_millis() as u64,
            "Recorded run metric"
        );
    }
}
