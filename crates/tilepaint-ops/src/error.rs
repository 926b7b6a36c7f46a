//! Error types for engine operations.

use thiserror::Error;

/// Error type for engine operations.
#[derive(Error, Debug)]
pub enum OpsError {
    /// Error from the pixel or storage layer.
    #[error(transparent)]
    Core(#[from] tilepaint_core::Error),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error reading a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A stroke job failed and the rest of the stroke was dropped.
    #[error("stroke {stroke} aborted: {reason}")]
    StrokeAborted {
        /// Stroke id.
        stroke: u64,
        /// What failed.
        reason: String,
    },
}

impl OpsError {
    /// Creates an [`OpsError::Config`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` for tile allocation or budget failures.
    pub fn is_allocation_error(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_allocation_error())
    }
}

/// Result type for engine operations.
pub type OpsResult<T> = Result<T, OpsError>;
