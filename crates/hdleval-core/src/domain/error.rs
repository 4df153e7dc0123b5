//! Domain-level error taxonomy for hdleval.

use std::path::PathBuf;

/// Errors produced by configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_iterations must be at least 1")]
    ZeroIterations,

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("confidence tracking needs at least one sample")]
    ZeroSamples,

    #[error("task budget must be positive, got {0}s")]
    NonPositiveBudget(f64),

    #[error("feedback_max_len must leave room for the ellipsis marker, got {0}")]
    FeedbackTooShort(usize),
}

/// hdleval domain errors.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hdleval domain operations.
pub type Result<T> = std::result::Result<T, EvalError>;
