//! Audit records and the sink that consumes them.
//!
//! The sink is fire-and-forget: `record` has no return value and the
//! broadcast result never depends on it. Implementations must not block.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use keyprop_id::{BroadcastId, GatewayId, KeyName};
use serde::{Deserialize, Serialize};

use crate::outcome::DeliveryState;
use crate::result::BroadcastSummary;

/// Outcome of one delivery attempt to one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub broadcast_id: BroadcastId,
    pub gateway_id: GatewayId,
    pub event_type: String,
    pub key_name: KeyName,
    #[serde(flatten)]
    pub state: DeliveryState,
    /// Wall time spent in the transport, absent for abandoned deliveries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

/// A record emitted to the audit sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Attempt(AttemptRecord),
    Summary(BroadcastSummary),
}

/// Consumer of audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Audit sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records received so far, in arrival order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Attempt(a) => Some(a),
                AuditRecord::Summary(_) => None,
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<BroadcastSummary> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Summary(s) => Some(s),
                AuditRecord::Attempt(_) => None,
            })
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
