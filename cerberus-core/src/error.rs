//! Error types for the Cerberus review pipeline

use thiserror::Error;

/// Result type alias for Cerberus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Cerberus operations
///
/// Reviewer-internal failures never surface here; they become SKIP verdicts.
/// `Error` is reserved for configuration and invocation problems (exit 2).
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (malformed document, empty roster, unknown perspective)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reviewer runtime error (missing prompt template, unusable workspace)
    #[error("Runner error: {0}")]
    Runner(String),

    /// Aggregation invocation error (no artifacts, bad verdict directory)
    #[error("Aggregation error: {0}")]
    Aggregate(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
