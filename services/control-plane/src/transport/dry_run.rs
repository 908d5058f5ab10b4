//! Dry-run transport: logs each delivery and reports success.

use async_trait::async_trait;
use keyprop_broadcast::{DeliveryError, DeploymentTarget, Transport};
use keyprop_events::DeliveryEnvelope;
use tracing::info;

/// Logs deliveries instead of sending them. Every delivery succeeds.
#[derive(Debug, Default)]
pub struct DryRunTransport;

impl DryRunTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    fn kind(&self) -> &'static str {
        "dry-run"
    }

    async fn deliver(
        &self,
        target: &DeploymentTarget,
        envelope: &DeliveryEnvelope,
    ) -> Result<(), DeliveryError> {
        info!(
            broadcast_id = %envelope.broadcast_id,
            gateway_id = %target.gateway_id,
            event_type = envelope.event.event_type(),
            key_name = %envelope.event.key_name(),
            "Dry run: skipping gateway delivery"
        );
        Ok(())
    }
}
