//! Error types for boundline operations.
//!
//! Defines the error types for the two failure surfaces of the crate:
//! - Configuration and construction (buffers, pipeline topology, env/file input)
//! - Pipeline execution (double start, worker failure)

use thiserror::Error;

/// Errors detected while building buffers or validating a pipeline configuration.
///
/// Every variant is reported before any worker starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Buffer capacity must be greater than 0")]
    ZeroCapacity,

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Target quantity {quantity} is not a multiple of batch size {batch_size}")]
    UnsatisfiableQuota { quantity: u64, batch_size: u64 },

    #[error("Quota for stage '{stage}' overflows: {quantity} x {ratio}")]
    QuotaOverflow {
        stage: String,
        quantity: u64,
        ratio: u64,
    },

    #[error("Duplicate stage name '{0}'")]
    DuplicateStage(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline has already been started")]
    AlreadyStarted,

    #[error("Stage '{stage}' worker failed: {message}")]
    WorkerFailed { stage: String, message: String },
}
