//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks per-stage output, deliveries, buffer depth, active stage workers
//! and run outcomes.
//!
//! # Example
//!
//! ```ignore
//! use boundline::metrics::{export_metrics, init_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run a pipeline ...
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_STAGES, BUFFER_DEPTH, DELIVERIES_TOTAL, REGISTRY, RUNS_TOTAL, RUN_DURATION,
    STAGE_UNITS_TOTAL,
};
