//! Fleet broadcast primitives.
//!
//! This library turns one API-key change into one delivery per gateway and
//! reduces the per-gateway outcomes to a single verdict. Key concepts:
//!
//! - **Target set**: the snapshot of gateways hosting the API when the
//!   broadcast starts.
//! - **Transport**: delivers one envelope to one gateway; may retry
//!   internally.
//! - **Verdict**: at-least-one-success. A change is propagated once any
//!   gateway has it; unreached gateways are reconciled elsewhere.
//!
//! # Invariants
//!
//! - An empty target set is never broadcast (`NoTargets`)
//! - Every target gets exactly one transport call per broadcast
//! - One target's failure, hang, or panic never affects another target
//! - Every outcome is terminal when `broadcast` returns
//! - The verdict depends on the set of outcomes, never on completion order

mod aggregate;
mod audit;
mod broadcaster;
mod error;
mod outcome;
mod result;
mod target;
mod transport;

use std::time::Duration;

pub use aggregate::{aggregate, AggregateFailure, PartialFailureWarning, Verdict};
pub use audit::{AttemptRecord, AuditRecord, AuditSink, MemoryAuditSink};
pub use broadcaster::{BroadcastConfig, Broadcaster};
pub use error::BroadcastError;
pub use outcome::{DeliveryOutcome, DeliveryState, OutcomeCounts};
pub use result::{BroadcastResult, BroadcastSummary};
pub use target::{DeploymentTarget, TargetSet};
pub use transport::{DeliveryError, Transport};

/// Re-export so callers can cancel broadcasts without a direct dependency.
pub use tokio_util::sync::CancellationToken;

/// Default bound on a single transport call.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a whole broadcast.
pub const DEFAULT_BROADCAST_DEADLINE: Duration = Duration::from_secs(30);
