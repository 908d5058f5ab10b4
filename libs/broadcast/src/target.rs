//! Deployment targets and the per-broadcast target snapshot.

use std::collections::BTreeMap;

use keyprop_id::GatewayId;
use serde::{Deserialize, Serialize};

use crate::error::BroadcastError;

/// One gateway that must receive an API's change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Gateway identifier.
    pub gateway_id: GatewayId,

    /// Routing data only the transport understands (endpoint, region, ...).
    #[serde(default)]
    pub routing: serde_json::Value,
}

impl DeploymentTarget {
    /// Create a target with no routing data.
    pub fn new(gateway_id: GatewayId) -> Self {
        Self {
            gateway_id,
            routing: serde_json::Value::Null,
        }
    }

    /// Attach routing data.
    pub fn with_routing(mut self, routing: serde_json::Value) -> Self {
        self.routing = routing;
        self
    }

    /// Look up a string routing attribute.
    pub fn routing_str(&self, key: &str) -> Option<&str> {
        self.routing.get(key).and_then(serde_json::Value::as_str)
    }
}

/// The fixed set of targets one broadcast delivers to.
///
/// Non-empty, one entry per gateway, ordered by `gateway_id`. Targets added
/// or removed from the topology after the snapshot is taken are not seen.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSet {
    targets: Vec<DeploymentTarget>,
}

impl TargetSet {
    /// Snapshot a list of targets.
    ///
    /// Duplicate gateway IDs keep their first entry. An empty input is
    /// rejected with [`BroadcastError::NoTargets`].
    pub fn new(targets: impl IntoIterator<Item = DeploymentTarget>) -> Result<Self, BroadcastError> {
        let mut by_gateway = BTreeMap::new();
        for target in targets {
            by_gateway
                .entry(target.gateway_id.clone())
                .or_insert(target);
        }

        if by_gateway.is_empty() {
            return Err(BroadcastError::NoTargets);
        }

        Ok(Self {
            targets: by_gateway.into_values().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeploymentTarget> {
        self.targets.iter()
    }

    pub fn gateway_ids(&self) -> impl Iterator<Item = &GatewayId> {
        self.targets.iter().map(|t| &t.gateway_id)
    }
}
