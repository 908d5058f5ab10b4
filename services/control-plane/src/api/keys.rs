//! API-key propagation endpoints.
//!
//! Keys are nested under APIs: /v1/orgs/{org_id}/apis/{handle}/keys
//!
//! Propagation runs on its own task. A client that disconnects mid-broadcast
//! does not abandon the deliveries; only the request token (shutdown) can.

use std::future::Future;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{post, put},
    Json, Router,
};
use keyprop_broadcast::BroadcastSummary;
use keyprop_id::{ApiHandle, OrgId, RequestId};
use serde::de::DeserializeOwned;
use tracing::error;

use crate::api::error::{ApiError, FieldError};
use crate::api::request_context::{RequestContext, REQUEST_ID_HEADER};
use crate::service::{CreateKeyRequest, PropagationError, UpdateKeyRequest};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orgs/{org_id}/apis/{handle}/keys", post(create_key))
        .route(
            "/orgs/{org_id}/apis/{handle}/keys/{key_name}",
            put(update_key).delete(revoke_key),
        )
}

/// POST /v1/orgs/{org_id}/apis/{handle}/keys
async fn create_key(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((org_id, handle)): Path<(String, String)>,
    body: Result<Json<CreateKeyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (org_id, handle) = parse_scope(&org_id, &handle, ctx.request_id)?;
    let request = parse_body(body, ctx.request_id)?;

    let request_id = ctx.request_id;
    let cancel = state.request_token();
    let summary = detached(request_id, async move {
        state
            .service()
            .create_key(request_id, &handle, &org_id, request, &cancel)
            .await
    })
    .await?;

    Ok(respond(StatusCode::CREATED, ctx.request_id, summary))
}

/// PUT /v1/orgs/{org_id}/apis/{handle}/keys/{key_name}
async fn update_key(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((org_id, handle, key_name)): Path<(String, String, String)>,
    body: Result<Json<UpdateKeyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (org_id, handle) = parse_scope(&org_id, &handle, ctx.request_id)?;
    let request = parse_body(body, ctx.request_id)?;

    let request_id = ctx.request_id;
    let cancel = state.request_token();
    let summary = detached(request_id, async move {
        state
            .service()
            .update_key(request_id, &handle, &org_id, &key_name, request, &cancel)
            .await
    })
    .await?;

    Ok(respond(StatusCode::OK, ctx.request_id, summary))
}

/// DELETE /v1/orgs/{org_id}/apis/{handle}/keys/{key_name}
async fn revoke_key(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((org_id, handle, key_name)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let (org_id, handle) = parse_scope(&org_id, &handle, ctx.request_id)?;

    let request_id = ctx.request_id;
    let cancel = state.request_token();
    let summary = detached(request_id, async move {
        state
            .service()
            .revoke_key(request_id, &handle, &org_id, &key_name, &cancel)
            .await
    })
    .await?;

    Ok(respond(StatusCode::OK, ctx.request_id, summary))
}

/// Run a propagation to completion on a spawned task.
///
/// Dropping the returned future (client disconnect) leaves the task running,
/// so every outcome still reaches the audit sink.
async fn detached<F>(request_id: RequestId, propagation: F) -> Result<BroadcastSummary, ApiError>
where
    F: Future<Output = Result<BroadcastSummary, PropagationError>> + Send + 'static,
{
    match tokio::spawn(propagation).await {
        Ok(result) => result.map_err(|e| propagation_error(e, request_id)),
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Propagation task failed");
            Err(
                ApiError::internal("internal_error", "Key propagation task failed")
                    .with_request_id(request_id.to_string()),
            )
        }
    }
}

fn respond(status: StatusCode, request_id: RequestId, summary: BroadcastSummary) -> Response {
    (
        status,
        [(HeaderName::from_static(REQUEST_ID_HEADER), request_id.to_string())],
        Json(summary),
    )
        .into_response()
}

fn parse_scope(
    org_id: &str,
    handle: &str,
    request_id: RequestId,
) -> Result<(OrgId, ApiHandle), ApiError> {
    let org_id = OrgId::parse(org_id).map_err(|e| {
        ApiError::bad_request("invalid_label", format!("Invalid organization ID: {e}"))
            .with_request_id(request_id.to_string())
    })?;
    let handle = ApiHandle::parse(handle).map_err(|e| {
        ApiError::bad_request("invalid_label", format!("Invalid API handle: {e}"))
            .with_request_id(request_id.to_string())
    })?;
    Ok((org_id, handle))
}

fn parse_body<T: DeserializeOwned>(
    body: Result<Json<T>, JsonRejection>,
    request_id: RequestId,
) -> Result<T, ApiError> {
    body.map(|Json(request)| request).map_err(|rejection| {
        ApiError::bad_request("invalid_body", rejection.body_text())
            .with_request_id(request_id.to_string())
    })
}

/// Map a propagation failure to its problem document.
fn propagation_error(err: PropagationError, request_id: RequestId) -> ApiError {
    let detail = err.to_string();
    let api_error = match err {
        PropagationError::NotFound { .. } => ApiError::not_found("api_not_found", detail),
        PropagationError::NoTargets { .. } => ApiError::conflict("no_deployments", detail),
        PropagationError::Validation(validation) => {
            let details = validation
                .violations
                .iter()
                .map(|v| FieldError {
                    field: v.field.to_string(),
                    message: v.message.clone(),
                })
                .collect();
            ApiError::bad_request("validation_failed", detail).with_details(details)
        }
        PropagationError::AggregateFailure { summary, .. } => {
            ApiError::bad_gateway("propagation_failed", detail).with_broadcast(summary)
        }
        PropagationError::DirectoryUnavailable(_) => {
            ApiError::service_unavailable("directory_unavailable", detail)
        }
        PropagationError::Topology(_) => {
            ApiError::service_unavailable("topology_unavailable", detail)
        }
        PropagationError::Envelope(_) => {
            error!(request_id = %request_id, error = %detail, "Failed to build delivery envelope");
            ApiError::internal("internal_error", "Failed to build delivery envelope")
        }
    };
    api_error.with_request_id(request_id.to_string())
}
