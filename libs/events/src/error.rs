//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when assembling or decoding events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// A required envelope field was not set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
