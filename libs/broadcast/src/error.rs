//! Broadcast precondition errors.

use thiserror::Error;

/// Errors raised before any delivery is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The API has no deployment targets; nothing was sent.
    #[error("no deployment targets")]
    NoTargets,
}
