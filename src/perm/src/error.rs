//! Error types for the permission gate

use crate::engine::decision::Denial;
use thiserror::Error;

/// Permission gate errors
#[derive(Debug, Error)]
pub enum PermError {
    /// Request was denied (access or configuration denial)
    #[error("Permission denied: {0}")]
    Denied(Box<Denial>),

    /// Malformed permission specification
    #[error("Invalid permission specification: {0}")]
    InvalidSpec(String),

    /// Malformed plugin configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed action request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Entity store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Downstream handler failure
    #[error("Handler error: {0}")]
    Handler(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PermError {
    /// The denial carried by this error, if it is one
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            PermError::Denied(denial) => Some(denial),
            _ => None,
        }
    }
}

impl From<Denial> for PermError {
    fn from(denial: Denial) -> Self {
        PermError::Denied(Box::new(denial))
    }
}

/// Result type for permission operations
pub type Result<T> = std::result::Result<T, PermError>;
