//! Error types for pixcloud components.
//!
//! None of these reach the rendering layer: reductions fall back to a random
//! layout and the session controller logs and retries. They exist for the
//! boundaries that can still say no (config files, worker spawning).

use thiserror::Error;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field is outside its allowed range
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure inside a dimensionality reducer.
///
/// Caught at the reducer boundary and replaced with a random embedding.
#[derive(Debug, Clone, Error)]
pub enum ReduceError {
    /// Input rows do not share one dimensionality
    #[error("dimension mismatch: row {row} has {found} values, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Optimizer produced NaN or infinity
    #[error("non-finite coordinate for point {index}")]
    NonFinite { index: usize },

    /// Reducer returned the wrong number of points
    #[error("reducer returned {found} points for {expected} inputs")]
    LengthMismatch { expected: usize, found: usize },

    /// Reducer panicked
    #[error("reducer panicked: {0}")]
    Panicked(String),
}

/// Result type for reducer operations.
pub type ReduceResult<T> = Result<T, ReduceError>;

/// Computation host errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// Worker thread could not be started
    #[error("failed to spawn computation worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// Worker thread is gone (channel closed)
    #[error("computation worker disconnected")]
    Disconnected,
}

/// Session controller errors.
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Host(#[from] HostError),
}
