//! Reduce per-target outcomes to a single verdict.
//!
//! # Policy
//!
//! - At least one success: the change counts as propagated (`Success`).
//! - No success at all: `AggregateFailure`, reporting the error of the
//!   failed target with the smallest `gateway_id`. If nothing failed (every
//!   target was cancelled) the smallest cancelled target is reported with
//!   [`DeliveryError::Cancelled`].
//! - Revocations that succeeded somewhere but not everywhere carry a
//!   [`PartialFailureWarning`]: the key may still be valid on the gateways
//!   listed there. Failed and cancelled targets both count.
//!
//! The verdict depends only on the kind and the set of outcomes, never on
//! their order.

use keyprop_events::ChangeKind;
use keyprop_id::GatewayId;
use serde::{Deserialize, Serialize};

use crate::error::BroadcastError;
use crate::outcome::DeliveryOutcome;
use crate::transport::DeliveryError;

/// Revocation reached some gateways but not all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailureWarning {
    /// Gateways that did not confirm the change, sorted.
    pub unconfirmed: Vec<GatewayId>,
}

/// Every target failed (or was abandoned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateFailure {
    /// Gateway whose error is reported.
    pub gateway_id: GatewayId,

    /// The reported error.
    pub error: DeliveryError,
}

/// Caller-visible result of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<PartialFailureWarning>,
    },
    AggregateFailure(AggregateFailure),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success { .. })
    }

    pub fn warning(&self) -> Option<&PartialFailureWarning> {
        match self {
            Verdict::Success { warning } => warning.as_ref(),
            Verdict::AggregateFailure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AggregateFailure> {
        match self {
            Verdict::AggregateFailure(failure) => Some(failure),
            Verdict::Success { .. } => None,
        }
    }
}

/// Aggregate outcomes under the at-least-one-success policy.
///
/// An empty outcome list is a precondition violation and yields
/// [`BroadcastError::NoTargets`].
pub fn aggregate(kind: ChangeKind, outcomes: &[DeliveryOutcome]) -> Result<Verdict, BroadcastError> {
    if outcomes.is_empty() {
        return Err(BroadcastError::NoTargets);
    }

    if outcomes.iter().any(DeliveryOutcome::is_success) {
        let warning = match kind {
            ChangeKind::Revoked => {
                let mut unconfirmed: Vec<GatewayId> = outcomes
                    .iter()
                    .filter(|o| !o.is_success())
                    .map(|o| o.gateway_id.clone())
                    .collect();
                unconfirmed.sort();
                (!unconfirmed.is_empty()).then_some(PartialFailureWarning { unconfirmed })
            }
            ChangeKind::Created | ChangeKind::Updated => None,
        };
        return Ok(Verdict::Success { warning });
    }

    let reported = outcomes
        .iter()
        .filter_map(|o| o.last_error().map(|e| (&o.gateway_id, e)))
        .min_by(|a, b| a.0.cmp(b.0))
        .map(|(gateway_id, error)| AggregateFailure {
            gateway_id: gateway_id.clone(),
            error: error.clone(),
        });

    let failure = match reported {
        Some(failure) => failure,
        None => {
            // Nothing failed and nothing succeeded: every target was cancelled.
            let gateway_id = outcomes
                .iter()
                .map(|o| &o.gateway_id)
                .min()
                .cloned()
                .ok_or(BroadcastError::NoTargets)?;
            AggregateFailure {
                gateway_id,
                error: DeliveryError::Cancelled,
            }
        }
    };

    Ok(Verdict::AggregateFailure(failure))
}
