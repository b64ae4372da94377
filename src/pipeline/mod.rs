//! Multi-stage production pipeline built on bounded buffers.
//!
//! This module provides:
//!
//! - **PipelineConfig**: topology, quotas and buffer capacities, with
//!   environment and YAML loading
//! - **PipelineCoordinator**: owns the buffers, runs one worker per stage and
//!   returns a **PipelineTally** once every quota is met
//! - **ProgressProbe / ProgressMonitor**: live, read-only progress reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use boundline::pipeline::{PipelineConfig, PipelineCoordinator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let coordinator = PipelineCoordinator::new(PipelineConfig::default())?;
//! let tally = coordinator.run().await?;
//! assert_eq!(tally.deliveries.completed, 1000);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod progress;
pub mod stage;

pub use config::{PipelineConfig, UpstreamConfig, DELIVERY_STAGE};
pub use coordinator::{PipelineCoordinator, PipelineTally};
pub use progress::{BufferDepth, ProgressMonitor, ProgressProbe, ProgressSnapshot, StageProgress};
pub use stage::{StageCounter, StageState, StageTally, Unit};
