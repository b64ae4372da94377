//! boundline: bounded blocking buffers and a quota-driven production pipeline.
//!
//! The [`buffer::BoundedBuffer`] is a fixed-capacity FIFO that blocks
//! producers while full and consumers while empty. The [`pipeline`] module
//! chains several of them into a multi-stage run that terminates once every
//! stage has met its quota.

pub mod buffer;
pub mod cli;
pub mod error;
pub mod metrics;
pub mod pipeline;

pub use buffer::BoundedBuffer;
pub use error::{ConfigError, PipelineError};
pub use pipeline::{PipelineConfig, PipelineCoordinator, PipelineTally};
