//! Audit sink that writes records to the `audit` tracing target.

use keyprop_broadcast::{AuditRecord, AuditSink, DeliveryState, Verdict};
use tracing::{error, info, warn};

/// Emits every audit record as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match record {
            AuditRecord::Attempt(attempt) => match &attempt.state {
                DeliveryState::Succeeded => info!(
                    target: "audit",
                    broadcast_id = %attempt.broadcast_id,
                    gateway_id = %attempt.gateway_id,
                    event_type = %attempt.event_type,
                    key_name = %attempt.key_name,
                    elapsed_ms = attempt.elapsed_ms,
                    "delivery succeeded"
                ),
                DeliveryState::Failed { error } => warn!(
                    target: "audit",
                    broadcast_id = %attempt.broadcast_id,
                    gateway_id = %attempt.gateway_id,
                    event_type = %attempt.event_type,
                    key_name = %attempt.key_name,
                    elapsed_ms = attempt.elapsed_ms,
                    error = %error,
                    retryable = error.is_retryable(),
                    "delivery failed"
                ),
                DeliveryState::Cancelled => warn!(
                    target: "audit",
                    broadcast_id = %attempt.broadcast_id,
                    gateway_id = %attempt.gateway_id,
                    event_type = %attempt.event_type,
                    key_name = %attempt.key_name,
                    "delivery cancelled"
                ),
            },
            AuditRecord::Summary(summary) => {
                let counts = summary.counts;
                match &summary.verdict {
                    Verdict::Success { warning: None } => info!(
                        target: "audit",
                        broadcast_id = %summary.broadcast_id,
                        request_id = %summary.request_id,
                        org_id = %summary.org_id,
                        api_handle = %summary.api_handle,
                        event_type = %summary.event_type,
                        key_name = %summary.key_name,
                        targets = summary.target_count,
                        succeeded = counts.succeeded,
                        failed = counts.failed,
                        cancelled = counts.cancelled,
                        "change propagated"
                    ),
                    Verdict::Success {
                        warning: Some(warning),
                    } => {
                        let unconfirmed: Vec<&str> =
                            warning.unconfirmed.iter().map(|g| g.as_str()).collect();
                        warn!(
                            target: "audit",
                            broadcast_id = %summary.broadcast_id,
                            request_id = %summary.request_id,
                            org_id = %summary.org_id,
                            api_handle = %summary.api_handle,
                            event_type = %summary.event_type,
                            key_name = %summary.key_name,
                            targets = summary.target_count,
                            succeeded = counts.succeeded,
                            failed = counts.failed,
                            cancelled = counts.cancelled,
                            unconfirmed = ?unconfirmed,
                            "revocation not confirmed on every gateway"
                        );
                    }
                    Verdict::AggregateFailure(failure) => error!(
                        target: "audit",
                        broadcast_id = %summary.broadcast_id,
                        request_id = %summary.request_id,
                        org_id = %summary.org_id,
                        api_handle = %summary.api_handle,
                        event_type = %summary.event_type,
                        key_name = %summary.key_name,
                        targets = summary.target_count,
                        failed = counts.failed,
                        cancelled = counts.cancelled,
                        reported_gateway = %failure.gateway_id,
                        error = %failure.error,
                        "change reached no gateway"
                    ),
                }
            }
        }
    }
}
