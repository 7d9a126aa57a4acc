//! Error types for vicinage.

use thiserror::Error;

/// Errors that can occur while building, configuring, or searching an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Unknown, contradictory, or out-of-range parameter.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad input data (empty dataset, short pivot file, unreadable vectors).
    #[error("data error: {0}")]
    Data(String),

    /// Broken internal invariant. Always a bug, never a user error.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// I/O failure while saving or loading an index.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed or truncated index file.
    #[error("persistence error: {0}")]
    Persist(String),
}

/// Result type alias for vicinage operations.
pub type Result<T> = std::result::Result<T, IndexError>;
