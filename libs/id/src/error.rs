//! Error types for ID parsing and label validation.

use thiserror::Error;

/// Errors that can occur when parsing IDs or validating labels.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("value cannot be empty")]
    Empty,

    /// The ID has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// The label exceeds the maximum length.
    #[error("value is {actual} bytes, maximum is {max}")]
    TooLong { max: usize, actual: usize },

    /// The label starts or ends with whitespace.
    #[error("value cannot start or end with whitespace")]
    SurroundingWhitespace,

    /// The label contains a control character.
    #[error("value contains a control character at byte {position}")]
    ControlCharacter { position: usize },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error indicates a prefix mismatch.
    pub fn is_prefix_error(&self) -> bool {
        matches!(self, IdError::InvalidPrefix { .. })
    }
}
