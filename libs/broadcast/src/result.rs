//! Broadcast results and their loggable summaries.

use std::sync::Arc;

use keyprop_events::{ChangeKind, DeliveryEnvelope};
use keyprop_id::{ApiHandle, ApiId, BroadcastId, KeyName, OrgId, RequestId};
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, Verdict};
use crate::error::BroadcastError;
use crate::outcome::{DeliveryOutcome, OutcomeCounts};

/// Everything one broadcast produced.
///
/// Built fresh per call and never persisted. It still holds the envelope
/// (and therefore key material), so only [`BroadcastResult::summary`] may be
/// logged or handed to the audit sink.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastResult {
    pub envelope: Arc<DeliveryEnvelope>,
    pub target_count: usize,
    /// One outcome per target, ordered by `gateway_id`.
    pub outcomes: Vec<DeliveryOutcome>,
    pub verdict: Verdict,
}

impl BroadcastResult {
    /// Assemble a result, sorting outcomes and computing the verdict.
    pub fn from_outcomes(
        envelope: Arc<DeliveryEnvelope>,
        mut outcomes: Vec<DeliveryOutcome>,
    ) -> Result<Self, BroadcastError> {
        outcomes.sort_by(|a, b| a.gateway_id.cmp(&b.gateway_id));
        let verdict = aggregate(envelope.event.kind(), &outcomes)?;

        Ok(Self {
            target_count: outcomes.len(),
            envelope,
            outcomes,
            verdict,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        self.envelope.event.kind()
    }

    pub fn broadcast_id(&self) -> BroadcastId {
        self.envelope.broadcast_id
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts::from_outcomes(&self.outcomes)
    }

    /// A copy of the result without key material.
    pub fn summary(&self) -> BroadcastSummary {
        let event = &self.envelope.event;
        let api = event.api();

        BroadcastSummary {
            broadcast_id: self.envelope.broadcast_id,
            request_id: self.envelope.request_id,
            org_id: api.org_id.clone(),
            api_handle: api.handle.clone(),
            api_id: api.api_id,
            key_name: event.key_name().clone(),
            kind: event.kind(),
            event_type: event.event_type().to_string(),
            target_count: self.target_count,
            counts: self.counts(),
            outcomes: self.outcomes.clone(),
            verdict: self.verdict.clone(),
        }
    }
}

/// Serializable, secret-free account of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSummary {
    pub broadcast_id: BroadcastId,
    pub request_id: RequestId,
    pub org_id: OrgId,
    pub api_handle: ApiHandle,
    pub api_id: ApiId,
    pub key_name: KeyName,
    pub kind: ChangeKind,
    pub event_type: String,
    pub target_count: usize,
    pub counts: OutcomeCounts,
    pub outcomes: Vec<DeliveryOutcome>,
    pub verdict: Verdict,
}
