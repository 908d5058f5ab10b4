//! Delivery envelope - the unit a transport hands to one gateway.

use chrono::{DateTime, Utc};
use keyprop_id::{BroadcastId, OrgId, RequestId};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::types::{ChangeEvent, EVENT_VERSION};

/// A change event plus the metadata every gateway receives with it.
///
/// The same envelope (same `broadcast_id`) goes to every target of one
/// broadcast, which lets gateways de-duplicate transport-level retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    /// Identifier of the broadcast this delivery belongs to.
    pub broadcast_id: BroadcastId,

    /// Request that triggered the change.
    pub request_id: RequestId,

    /// Owning organization.
    pub org_id: OrgId,

    /// When the change was accepted by the control plane.
    pub occurred_at: DateTime<Utc>,

    /// Schema version of the event payload.
    pub event_version: i32,

    /// The change itself.
    pub event: ChangeEvent,
}

impl DeliveryEnvelope {
    /// Creates a new envelope builder.
    pub fn builder() -> DeliveryEnvelopeBuilder {
        DeliveryEnvelopeBuilder::new()
    }

    /// Serialize the envelope for the wire.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EventError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an envelope received from the wire.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Builder for constructing delivery envelopes.
#[derive(Debug, Default)]
pub struct DeliveryEnvelopeBuilder {
    broadcast_id: Option<BroadcastId>,
    request_id: Option<RequestId>,
    occurred_at: Option<DateTime<Utc>>,
    event: Option<ChangeEvent>,
}

impl DeliveryEnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast_id(mut self, id: BroadcastId) -> Self {
        self.broadcast_id = Some(id);
        self
    }

    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    pub fn event(mut self, event: ChangeEvent) -> Self {
        self.event = Some(event);
        self
    }

    /// Builds the envelope.
    ///
    /// `broadcast_id` is generated and `occurred_at` defaults to now when
    /// unset. The org is taken from the event's API identity.
    pub fn build(self) -> Result<DeliveryEnvelope, EventError> {
        let event = self.event.ok_or(EventError::MissingField("event"))?;
        let request_id = self
            .request_id
            .ok_or(EventError::MissingField("request_id"))?;

        Ok(DeliveryEnvelope {
            broadcast_id: self.broadcast_id.unwrap_or_default(),
            request_id,
            org_id: event.api().org_id.clone(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            event_version: EVENT_VERSION,
            event,
        })
    }
}
