//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by boundline and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Global Prometheus registry for all boundline metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Units produced, labeled by stage.
pub static STAGE_UNITS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Completed deliveries.
pub static DELIVERIES_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Items sitting in each buffer, labeled by the stage that fills it.
pub static BUFFER_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Stage workers currently running.
pub static ACTIVE_STAGES: OnceLock<Gauge> = OnceLock::new();

/// Pipeline runs, labeled by outcome.
pub static RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Pipeline run duration in seconds, labeled by outcome.
pub static RUN_DURATION: OnceLock<HistogramVec> = OnceLock::new();

static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup; later calls leave the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric creation or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let stage_units_total = CounterVec::new(
        Opts::new("boundline_stage_units_total", "Units produced per stage"),
        &["stage"],
    )?;

    let deliveries_total = Counter::new("boundline_deliveries_total", "Completed deliveries")?;

    let buffer_depth = GaugeVec::new(
        Opts::new("boundline_buffer_depth", "Items currently held in a buffer"),
        &["buffer"],
    )?;

    let active_stages = Gauge::new("boundline_active_stages", "Stage workers currently running")?;

    let runs_total = CounterVec::new(
        Opts::new("boundline_runs_total", "Pipeline runs by outcome"),
        &["status"],
    )?;

    let run_duration = HistogramVec::new(
        HistogramOpts::new(
            "boundline_run_duration_seconds",
            "Pipeline run duration in seconds",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["status"],
    )?;

    registry.register(Box::new(stage_units_total.clone()))?;
    registry.register(Box::new(deliveries_total.clone()))?;
    registry.register(Box::new(buffer_depth.clone()))?;
    registry.register(Box::new(active_stages.clone()))?;
    registry.register(Box::new(runs_total.clone()))?;
    registry.register(Box::new(run_duration.clone()))?;

    // Registry goes last: its presence marks initialization as finished
    let _ = STAGE_UNITS_TOTAL.set(stage_units_total);
    let _ = DELIVERIES_TOTAL.set(deliveries_total);
    let _ = BUFFER_DEPTH.set(buffer_depth);
    let _ = ACTIVE_STAGES.set(active_stages);
    let _ = RUNS_TOTAL.set(runs_total);
    let _ = RUN_DURATION.set(run_duration);
    let _ = REGISTRY.set(registry);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
