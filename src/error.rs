//! Error types for resumable-batch
//!
//! Engine-level failures (bad configuration, store connectivity) use the
//! propagating [`Error`] channel. Per-item failures never appear here: the
//! engine classifies them as data and tallies them into the batch report.

use thiserror::Error;

/// Result type alias for resumable-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for resumable-batch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// State store operation failed
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// Checkpoint (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (available to item processors)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Construct a configuration error for a named config key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// State-store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or connect to the backing store
    #[error("failed to connect to state store: {0}")]
    ConnectionFailed(String),

    /// Failed to run schema migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}
