//! Key propagation scenarios against a static registry and a recording
//! transport.

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use keyprop_broadcast::{
    BroadcastConfig, Broadcaster, DeliveryError, DeliveryState, MemoryAuditSink, Verdict,
};
use keyprop_control_plane::{
    registry::{ApiDirectory, DirectoryError, StaticRegistry},
    service::{CreateKeyRequest, KeyPropagationService, PropagationError, UpdateKeyRequest},
};
use keyprop_events::{ApiIdentity, ChangeKind, KeyMaterial};
use keyprop_id::{ApiHandle, OrgId, RequestId};
use rstest::rstest;
use support::{handle, Harness, RecordingTransport, REGISTRY, SECRET};
use tokio_util::sync::CancellationToken;

fn org1() -> OrgId {
    OrgId::parse("org1").unwrap()
}

fn create_request() -> CreateKeyRequest {
    CreateKeyRequest {
        name: Some("mobile".into()),
        api_key: Some(KeyMaterial::new(SECRET)),
        ..CreateKeyRequest::default()
    }
}

#[tokio::test]
async fn test_single_gateway_failure_still_propagates() {
    let harness = Harness::new(RecordingTransport::failing(&["g2"]));

    let summary = harness
        .service
        .create_key(
            RequestId::new(),
            &handle("orders-api"),
            &org1(),
            create_request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.verdict, Verdict::Success { warning: None });
    let states: Vec<(&str, bool)> = summary
        .outcomes
        .iter()
        .map(|o| (o.gateway_id.as_str(), o.is_success()))
        .collect();
    assert_eq!(states, [("g1", true), ("g2", false), ("g3", true)]);
    assert_eq!(harness.transport.call_count(), 3);
}

#[tokio::test]
async fn test_api_without_deployments_is_no_targets() {
    let harness = Harness::new(RecordingTransport::default());

    let err = harness
        .service
        .create_key(
            RequestId::new(),
            &handle("staging-api"),
            &org1(),
            create_request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PropagationError::NoTargets { .. }));
    assert_eq!(harness.transport.call_count(), 0);
    assert!(harness.audit.records().is_empty());
}

#[tokio::test]
async fn test_no_targets_reported_before_validation() {
    let harness = Harness::new(RecordingTransport::default());

    let err = harness
        .service
        .create_key(
            RequestId::new(),
            &handle("staging-api"),
            &org1(),
            CreateKeyRequest::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PropagationError::NoTargets { .. }));
}

#[tokio::test]
async fn test_unknown_api_is_not_found() {
    let harness = Harness::new(RecordingTransport::default());

    let err = harness
        .service
        .revoke_key(
            RequestId::new(),
            &handle("orders-api"),
            &OrgId::parse("org2").unwrap(),
            "mobile",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PropagationError::NotFound { .. }));
    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_delivery() {
    let harness = Harness::new(RecordingTransport::default());

    let err = harness
        .service
        .update_key(
            RequestId::new(),
            &handle("orders-api"),
            &org1(),
            "mobile",
            UpdateKeyRequest::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        PropagationError::Validation(validation) => {
            assert_eq!(validation.kind, ChangeKind::Updated);
            assert_eq!(validation.violations[0].field, "key_material");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test]
async fn test_all_gateways_failing_is_aggregate_failure() {
    let harness = Harness::new(RecordingTransport::failing(&["g1", "g2", "g3"]));

    let err = harness
        .service
        .update_key(
            RequestId::new(),
            &handle("orders-api"),
            &org1(),
            "mobile",
            UpdateKeyRequest {
                api_key: Some(KeyMaterial::new(SECRET)),
                expires_at: None,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    match err {
        PropagationError::AggregateFailure {
            gateway_id,
            error,
            summary,
        } => {
            assert_eq!(gateway_id.as_str(), "g1");
            assert_eq!(
                error,
                DeliveryError::Unreachable {
                    message: "g1 connection refused".into()
                }
            );
            assert_eq!(summary.counts.failed, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[rstest]
#[case::created(ChangeKind::Created, false)]
#[case::updated(ChangeKind::Updated, false)]
#[case::revoked(ChangeKind::Revoked, true)]
#[tokio::test]
async fn test_partial_failure_warning_surfaces_only_in_summary(
    #[case] kind: ChangeKind,
    #[case] warns: bool,
) {
    let harness = Harness::new(RecordingTransport::failing(&["g3"]));
    let cancel = CancellationToken::new();
    let api = handle("orders-api");

    let result = match kind {
        ChangeKind::Created => {
            harness
                .service
                .create_key(RequestId::new(), &api, &org1(), create_request(), &cancel)
                .await
        }
        ChangeKind::Updated => {
            harness
                .service
                .update_key(
                    RequestId::new(),
                    &api,
                    &org1(),
                    "mobile",
                    UpdateKeyRequest {
                        api_key: Some(KeyMaterial::new(SECRET)),
                        expires_at: None,
                    },
                    &cancel,
                )
                .await
        }
        ChangeKind::Revoked => {
            harness
                .service
                .revoke_key(RequestId::new(), &api, &org1(), "mobile", &cancel)
                .await
        }
    };

    let summary = result.unwrap();
    assert!(summary.verdict.is_success());
    assert_eq!(summary.verdict.warning().is_some(), warns);

    let audited = harness.audit.summaries();
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0], summary);
}

#[tokio::test]
async fn test_revocation_never_sends_key_material() {
    let harness = Harness::new(RecordingTransport::default());

    harness
        .service
        .revoke_key(
            RequestId::new(),
            &handle("orders-api"),
            &org1(),
            "mobile",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let bodies = harness.transport.bodies();
    assert_eq!(bodies.len(), 3);
    for body in bodies {
        assert_eq!(body["event"]["event_type"], "api_key.revoked");
        assert!(body["event"]["payload"].get("key_material").is_none());
    }
}

#[tokio::test]
async fn test_one_envelope_shared_by_every_gateway() {
    let harness = Harness::new(RecordingTransport::default());
    let request_id = RequestId::new();

    let summary = harness
        .service
        .create_key(
            request_id,
            &handle("orders-api"),
            &org1(),
            create_request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.request_id, request_id);
    for (gateway, calls) in harness.transport.calls_per_gateway() {
        assert_eq!(calls, 1, "gateway {gateway}");
    }
    for body in harness.transport.bodies() {
        assert_eq!(body["broadcast_id"], summary.broadcast_id.to_string());
        assert_eq!(body["request_id"], request_id.to_string());
        assert_eq!(body["event"]["payload"]["operation_scope"], "all_operations");
        assert_eq!(body["event"]["payload"]["key_material"], SECRET);
    }

    // The audit trail never carries the secret.
    let audited = serde_json::to_string(&harness.audit.records()).unwrap();
    assert!(!audited.contains(SECRET));
}

#[tokio::test]
async fn test_cancelled_request_reports_every_gateway_cancelled() {
    let harness = Harness::new(RecordingTransport::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = harness
        .service
        .revoke_key(RequestId::new(), &handle("orders-api"), &org1(), "mobile", &cancel)
        .await
        .unwrap_err();

    match err {
        PropagationError::AggregateFailure { error, summary, .. } => {
            assert_eq!(error, DeliveryError::Cancelled);
            assert!(summary
                .outcomes
                .iter()
                .all(|o| o.state == DeliveryState::Cancelled));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

struct UnavailableDirectory;

#[async_trait]
impl ApiDirectory for UnavailableDirectory {
    async fn resolve(
        &self,
        _handle: &ApiHandle,
        _org_id: &OrgId,
    ) -> Result<ApiIdentity, DirectoryError> {
        Err(DirectoryError::Unavailable("connection reset".into()))
    }
}

#[tokio::test]
async fn test_directory_outage_is_retryable() {
    let registry = Arc::new(StaticRegistry::from_toml_str(REGISTRY).unwrap());
    let transport = Arc::new(RecordingTransport::default());
    let service = KeyPropagationService::new(
        Arc::new(UnavailableDirectory),
        registry,
        Broadcaster::new(
            transport.clone(),
            Arc::new(MemoryAuditSink::new()),
            BroadcastConfig::default(),
        ),
    );

    let err = service
        .create_key(
            RequestId::new(),
            &handle("orders-api"),
            &org1(),
            create_request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PropagationError::DirectoryUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(transport.call_count(), 0);
}
