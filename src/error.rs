//! Error types for lead store operations.

use thiserror::Error;

/// Errors that can occur while reading or writing leads.
#[derive(Error, Debug)]
pub enum LeadError {
    /// Lead is missing required fields
    #[error("Missing required fields: {}", .missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    /// Lead file or record does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Email pipeline failed
    #[error("{0}")]
    Pipeline(String),
}

pub type Result<T> = std::result::Result<T, LeadError>;
