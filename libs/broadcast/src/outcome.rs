//! Per-target delivery outcomes.

use keyprop_id::GatewayId;
use serde::{Deserialize, Serialize};

use crate::transport::DeliveryError;

/// Terminal state of one delivery.
///
/// A delivery starts pending and moves to exactly one of these states. There
/// is no pending variant: an outcome only exists once the state is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    /// The gateway acknowledged the event.
    Succeeded,

    /// The gateway rejected the event or could not be reached.
    Failed { error: DeliveryError },

    /// The caller gave up before this delivery finished.
    Cancelled,
}

/// Terminal outcome for one target of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub gateway_id: GatewayId,

    #[serde(flatten)]
    pub state: DeliveryState,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.state, DeliveryState::Succeeded)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, DeliveryState::Cancelled)
    }

    /// The error that ended this delivery, if it failed.
    pub fn last_error(&self) -> Option<&DeliveryError> {
        match &self.state {
            DeliveryState::Failed { error } => Some(error),
            DeliveryState::Succeeded | DeliveryState::Cancelled => None,
        }
    }
}

/// Outcome tallies for a broadcast.
///
/// `succeeded + failed + cancelled` always equals the number of targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl OutcomeCounts {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a DeliveryOutcome>) -> Self {
        let mut counts = Self::default();
        for outcome in outcomes {
            match outcome.state {
                DeliveryState::Succeeded => counts.succeeded += 1,
                DeliveryState::Failed { .. } => counts.failed += 1,
                DeliveryState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}
