//! Error types for the Cerberus GitHub layer

use thiserror::Error;

/// Result type alias for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication failure (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Token lacks `pull-requests: write` permission
    #[error("Permission error: {0}")]
    Permission(String),

    /// Parse error (URLs, API payloads)
    #[error("Parse error: {0}")]
    Parse(String),

    /// PR not found
    #[error("Pull request #{0} not found")]
    PrNotFound(u64),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
