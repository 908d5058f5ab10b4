//! Transport interface: deliver one envelope to one gateway.
//!
//! Implementations may retry internally. The broadcaster calls
//! [`Transport::deliver`] exactly once per target and never retries itself.

use async_trait::async_trait;
use keyprop_events::DeliveryEnvelope;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::DeploymentTarget;

/// Why a delivery to a single gateway did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryError {
    /// The gateway could not be reached (connect/reset/DNS).
    #[error("gateway unreachable: {message}")]
    Unreachable { message: String },

    /// The gateway answered and refused the event.
    #[error("gateway rejected event (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The delivery did not finish in time.
    #[error("delivery timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The target or response could not be interpreted.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The delivery task panicked.
    #[error("delivery task panicked: {message}")]
    Panicked { message: String },

    /// The delivery was abandoned before it finished.
    #[error("delivery cancelled before completion")]
    Cancelled,
}

impl DeliveryError {
    /// Returns true if a transport may reasonably try the same gateway again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Unreachable { .. } | DeliveryError::Timeout { .. } => true,
            DeliveryError::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            DeliveryError::Protocol { .. }
            | DeliveryError::Panicked { .. }
            | DeliveryError::Cancelled => false,
        }
    }
}

/// Delivers change events to gateways.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name of the transport kind, for logs.
    fn kind(&self) -> &'static str;

    /// Deliver one envelope to one target and report the terminal result.
    async fn deliver(
        &self,
        target: &DeploymentTarget,
        envelope: &DeliveryEnvelope,
    ) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DeliveryError::Unreachable { message: "refused".into() }, true)]
    #[case(DeliveryError::Timeout { timeout_ms: 10 }, true)]
    #[case(DeliveryError::Rejected { status: 503, message: String::new() }, true)]
    #[case(DeliveryError::Rejected { status: 429, message: String::new() }, true)]
    #[case(DeliveryError::Rejected { status: 408, message: String::new() }, true)]
    #[case(DeliveryError::Rejected { status: 400, message: String::new() }, false)]
    #[case(DeliveryError::Rejected { status: 401, message: String::new() }, false)]
    #[case(DeliveryError::Protocol { message: "no endpoint".into() }, false)]
    #[case(DeliveryError::Cancelled, false)]
    fn test_retryable_classification(#[case] error: DeliveryError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn test_delivery_error_serialization() {
        let json = serde_json::to_value(DeliveryError::Rejected {
            status: 403,
            message: "forbidden".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "rejected", "status": 403, "message": "forbidden"})
        );
    }
}
