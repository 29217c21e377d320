//! Error types for trialbase.

use thiserror::Error;

/// Result type alias using trialbase's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for trialbase operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// A required field is missing or malformed
    #[error("{0}")]
    Validation(String),

    /// Attempt to mutate a protected system resource
    #[error("Protected resource: {0}")]
    Protected(String),

    /// Sequential identifier allocation exhausted its retries
    #[error("Identifier allocation failed: {0}")]
    IdentifierAllocation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Validation error for a missing acting-user id on a write operation.
    ///
    /// Every write endpoint uses the same message so clients can match on
    /// `/user_id.*required/i`.
    pub fn user_id_required() -> Self {
        Error::Validation("user_id is required for activity logging".to_string())
    }
}
