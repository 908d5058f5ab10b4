//! Key propagation operations: create, update, and revoke.
//!
//! Each operation runs the same pipeline:
//! resolve identity -> list targets -> build event -> broadcast -> verdict.
//! Precondition failures (`NotFound`, `NoTargets`, `Validation`) are raised
//! before any gateway is contacted. A partial revocation is reported
//! through the summary and the audit sink, never as an error.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keyprop_broadcast::{
    BroadcastError, BroadcastSummary, Broadcaster, CancellationToken, DeliveryError, TargetSet,
    Verdict,
};
use keyprop_events::{
    build_event, ChangeIntent, ChangeKind, DeliveryEnvelope, EventError, KeyFields, KeyMaterial,
    OperationScope, ValidationError,
};
use keyprop_id::{ApiHandle, GatewayId, OrgId, RequestId};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::registry::{ApiDirectory, DeploymentTopology, DirectoryError, TopologyError};

/// Body of a create-key request.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateKeyRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub api_key: Option<KeyMaterial>,
    #[serde(default)]
    pub external_ref_id: Option<String>,
    #[serde(default)]
    pub operation_scope: Option<OperationScope>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for CreateKeyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateKeyRequest")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("external_ref_id", &self.external_ref_id)
            .field("operation_scope", &self.operation_scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body of an update-key (rotation) request.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateKeyRequest {
    pub api_key: Option<KeyMaterial>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for UpdateKeyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateKeyRequest")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("API '{handle}' not found in org '{org_id}'")]
    NotFound { handle: ApiHandle, org_id: OrgId },

    #[error("API '{handle}' has no deployments")]
    NoTargets { handle: ApiHandle },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No gateway accepted the change. `error` comes from `gateway_id`, the
    /// smallest failed gateway.
    #[error("change reached no gateway ({gateway_id}: {error})")]
    AggregateFailure {
        gateway_id: GatewayId,
        error: DeliveryError,
        summary: Box<BroadcastSummary>,
    },

    #[error("API directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("deployment topology unavailable: {0}")]
    Topology(String),

    #[error("failed to build delivery envelope: {0}")]
    Envelope(#[from] EventError),
}

impl PropagationError {
    /// True when the request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PropagationError::AggregateFailure { .. }
                | PropagationError::DirectoryUnavailable(_)
                | PropagationError::Topology(_)
        )
    }
}

/// Propagates API-key changes to every gateway hosting the API.
pub struct KeyPropagationService {
    directory: Arc<dyn ApiDirectory>,
    topology: Arc<dyn DeploymentTopology>,
    broadcaster: Broadcaster,
}

impl KeyPropagationService {
    pub fn new(
        directory: Arc<dyn ApiDirectory>,
        topology: Arc<dyn DeploymentTopology>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            directory,
            topology,
            broadcaster,
        }
    }

    pub fn directory(&self) -> &dyn ApiDirectory {
        self.directory.as_ref()
    }

    #[instrument(skip_all, fields(request_id = %request_id, handle = %handle, org_id = %org_id))]
    pub async fn create_key(
        &self,
        request_id: RequestId,
        handle: &ApiHandle,
        org_id: &OrgId,
        request: CreateKeyRequest,
        cancel: &CancellationToken,
    ) -> Result<BroadcastSummary, PropagationError> {
        let fields = KeyFields {
            name: request.name,
            display_name: request.display_name,
            key_material: request.api_key,
            external_ref_id: request.external_ref_id,
            operation_scope: request.operation_scope,
            expires_at: request.expires_at,
            ..KeyFields::default()
        };
        self.propagate(ChangeKind::Created, request_id, handle, org_id, fields, cancel)
            .await
    }

    #[instrument(
        skip_all,
        fields(request_id = %request_id, handle = %handle, org_id = %org_id, key_name = %key_name)
    )]
    pub async fn update_key(
        &self,
        request_id: RequestId,
        handle: &ApiHandle,
        org_id: &OrgId,
        key_name: &str,
        request: UpdateKeyRequest,
        cancel: &CancellationToken,
    ) -> Result<BroadcastSummary, PropagationError> {
        let fields = KeyFields {
            key_name: Some(key_name.to_string()),
            key_material: request.api_key,
            expires_at: request.expires_at,
            ..KeyFields::default()
        };
        self.propagate(ChangeKind::Updated, request_id, handle, org_id, fields, cancel)
            .await
    }

    #[instrument(
        skip_all,
        fields(request_id = %request_id, handle = %handle, org_id = %org_id, key_name = %key_name)
    )]
    pub async fn revoke_key(
        &self,
        request_id: RequestId,
        handle: &ApiHandle,
        org_id: &OrgId,
        key_name: &str,
        cancel: &CancellationToken,
    ) -> Result<BroadcastSummary, PropagationError> {
        let fields = KeyFields {
            key_name: Some(key_name.to_string()),
            ..KeyFields::default()
        };
        self.propagate(ChangeKind::Revoked, request_id, handle, org_id, fields, cancel)
            .await
    }

    async fn propagate(
        &self,
        intent: ChangeIntent,
        request_id: RequestId,
        handle: &ApiHandle,
        org_id: &OrgId,
        fields: KeyFields,
        cancel: &CancellationToken,
    ) -> Result<BroadcastSummary, PropagationError> {
        let identity = self
            .directory
            .resolve(handle, org_id)
            .await
            .map_err(|e| match e {
                DirectoryError::NotFound { handle, org_id } => {
                    PropagationError::NotFound { handle, org_id }
                }
                DirectoryError::Unavailable(msg) => PropagationError::DirectoryUnavailable(msg),
            })?;

        let targets = self
            .topology
            .list_targets(&identity)
            .await
            .map_err(|e| match e {
                TopologyError::NotFound(_) => PropagationError::NotFound {
                    handle: handle.clone(),
                    org_id: org_id.clone(),
                },
                TopologyError::Unavailable(msg) => PropagationError::Topology(msg),
            })?;

        let targets = TargetSet::new(targets).map_err(|e| match e {
            BroadcastError::NoTargets => PropagationError::NoTargets {
                handle: handle.clone(),
            },
        })?;

        let event = build_event(intent, &identity, &fields)?;
        let envelope = DeliveryEnvelope::builder()
            .request_id(request_id)
            .event(event)
            .build()?;

        let result = self
            .broadcaster
            .broadcast(Arc::new(envelope), &targets, cancel)
            .await
            .map_err(|e| match e {
                BroadcastError::NoTargets => PropagationError::NoTargets {
                    handle: handle.clone(),
                },
            })?;

        let summary = result.summary();
        match result.verdict {
            Verdict::Success { warning: None } => {
                info!(broadcast_id = %summary.broadcast_id, "Key change propagated");
                Ok(summary)
            }
            Verdict::Success { warning: Some(_) } => {
                warn!(
                    broadcast_id = %summary.broadcast_id,
                    "Key change propagated with unconfirmed gateways"
                );
                Ok(summary)
            }
            Verdict::AggregateFailure(failure) => Err(PropagationError::AggregateFailure {
                gateway_id: failure.gateway_id,
                error: failure.error,
                summary: Box::new(summary),
            }),
        }
    }
}
