//! Shared harness for control plane integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keyprop_broadcast::{
    BroadcastConfig, Broadcaster, DeliveryError, DeploymentTarget, MemoryAuditSink, Transport,
};
use keyprop_control_plane::{
    api, registry::StaticRegistry, service::KeyPropagationService, state::AppState,
};
use keyprop_events::{ChangeKind, DeliveryEnvelope};
use keyprop_id::ApiHandle;
use tokio_util::sync::CancellationToken;

pub const SECRET: &str = "sk_live_integration_secret";

/// `orders-api` runs on three gateways; `staging-api` on none.
pub const REGISTRY: &str = r#"
[[apis]]
handle = "orders-api"
org_id = "org1"
api_id = "api_01HV4Z2WQXKJNM8GPQY6VBKC3D"

[[apis.deployments]]
gateway_id = "g1"
endpoint = "https://g1.internal"

[[apis.deployments]]
gateway_id = "g2"
endpoint = "https://g2.internal"

[[apis.deployments]]
gateway_id = "g3"
endpoint = "https://g3.internal"

[[apis]]
handle = "staging-api"
org_id = "org1"
api_id = "api_01HV4Z2WQXKJNM8GPQY6VBKC3E"
"#;

/// Records every delivery; fails or hangs for the configured gateways.
#[derive(Default)]
pub struct RecordingTransport {
    failing: HashSet<String>,
    hanging: HashSet<String>,
    deliveries: Mutex<Vec<(String, ChangeKind, Vec<u8>)>>,
}

impl RecordingTransport {
    pub fn failing(gateways: &[&str]) -> Self {
        Self {
            failing: gateways.iter().map(|g| g.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Deliveries to these gateways never finish on their own.
    pub fn hanging(gateways: &[&str]) -> Self {
        Self {
            hanging: gateways.iter().map(|g| g.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn calls_per_gateway(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for (gateway, _, _) in self.deliveries.lock().unwrap().iter() {
            *counts.entry(gateway.clone()).or_default() += 1;
        }
        counts
    }

    /// Wire bodies sent to gateways, decoded as JSON.
    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, body)| serde_json::from_slice(body).unwrap())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn deliver(
        &self,
        target: &DeploymentTarget,
        envelope: &DeliveryEnvelope,
    ) -> Result<(), DeliveryError> {
        let gateway = target.gateway_id.to_string();
        let body = envelope.to_json_bytes().unwrap();
        self.deliveries
            .lock()
            .unwrap()
            .push((gateway.clone(), envelope.event.kind(), body));

        if self.hanging.contains(&gateway) {
            std::future::pending::<()>().await;
        }

        if self.failing.contains(&gateway) {
            Err(DeliveryError::Unreachable {
                message: format!("{gateway} connection refused"),
            })
        } else {
            Ok(())
        }
    }
}

pub struct Harness {
    pub service: Arc<KeyPropagationService>,
    pub transport: Arc<RecordingTransport>,
    pub audit: Arc<MemoryAuditSink>,
    pub shutdown: CancellationToken,
    registry: Arc<StaticRegistry>,
}

impl Harness {
    pub fn new(transport: RecordingTransport) -> Self {
        let registry = Arc::new(StaticRegistry::from_toml_str(REGISTRY).unwrap());
        let transport = Arc::new(transport);
        let audit = Arc::new(MemoryAuditSink::new());
        let broadcaster = Broadcaster::new(
            transport.clone(),
            audit.clone(),
            BroadcastConfig::default(),
        );

        Self {
            service: Arc::new(KeyPropagationService::new(
                registry.clone(),
                registry.clone(),
                broadcaster,
            )),
            transport,
            audit,
            shutdown: CancellationToken::new(),
            registry,
        }
    }

    /// Router over a fresh service sharing this harness' transport and audit sink.
    pub fn router(&self) -> axum::Router {
        let broadcaster = Broadcaster::new(
            self.transport.clone(),
            self.audit.clone(),
            BroadcastConfig::default(),
        );
        let service =
            KeyPropagationService::new(self.registry.clone(), self.registry.clone(), broadcaster);
        api::create_router(AppState::new(service, "recording", self.shutdown.clone()))
    }
}

pub fn handle(s: &str) -> ApiHandle {
    ApiHandle::parse(s).unwrap()
}
