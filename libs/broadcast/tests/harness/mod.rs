//! Shared fixtures for broadcast integration tests.
//!
//! `ScriptedTransport` plays back a per-gateway behaviour and counts every
//! call it receives.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keyprop_broadcast::{DeliveryError, DeploymentTarget, TargetSet, Transport};
use keyprop_events::{
    build_event, ApiIdentity, ChangeKind, DeliveryEnvelope, KeyFields, KeyMaterial,
};
use keyprop_id::{ApiHandle, ApiId, GatewayId, OrgId, RequestId};

/// Secret used by every fixture event.
pub const FIXTURE_SECRET: &str = "sk_live_fixture_do_not_log";

#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed,
    Fail(DeliveryError),
    Panic,
    Hang,
}

#[derive(Debug, Clone)]
struct Step {
    delay: Duration,
    behaviour: Behaviour,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: HashMap<String, Step>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, gateway: &str, behaviour: Behaviour) -> Self {
        self.on_after(gateway, Duration::ZERO, behaviour)
    }

    pub fn on_after(mut self, gateway: &str, delay: Duration, behaviour: Behaviour) -> Self {
        self.script
            .insert(gateway.to_string(), Step { delay, behaviour });
        self
    }

    pub fn calls_for(&self, gateway: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(gateway)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn deliver(
        &self,
        target: &DeploymentTarget,
        _envelope: &DeliveryEnvelope,
    ) -> Result<(), DeliveryError> {
        let gateway = target.gateway_id.as_str().to_string();
        *self.calls.lock().unwrap().entry(gateway.clone()).or_default() += 1;

        let step = self.script.get(&gateway).cloned().unwrap_or(Step {
            delay: Duration::ZERO,
            behaviour: Behaviour::Succeed,
        });

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        match step.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail(error) => Err(error),
            Behaviour::Panic => panic!("boom from {gateway}"),
            Behaviour::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

pub fn unreachable(gateway: &str) -> DeliveryError {
    DeliveryError::Unreachable {
        message: format!("{gateway} connection refused"),
    }
}

pub fn targets(ids: &[&str]) -> TargetSet {
    TargetSet::new(ids.iter().map(|id| {
        DeploymentTarget::new(GatewayId::parse(*id).unwrap())
            .with_routing(serde_json::json!({ "endpoint": format!("https://{id}.internal") }))
    }))
    .unwrap()
}

pub fn identity() -> ApiIdentity {
    ApiIdentity {
        handle: ApiHandle::parse("orders-api").unwrap(),
        api_id: ApiId::new(),
        org_id: OrgId::parse("org1").unwrap(),
    }
}

pub fn envelope(kind: ChangeKind) -> Arc<DeliveryEnvelope> {
    let fields = match kind {
        ChangeKind::Created => KeyFields {
            name: Some("mobile".into()),
            key_material: Some(KeyMaterial::new(FIXTURE_SECRET)),
            ..Default::default()
        },
        ChangeKind::Updated => KeyFields {
            key_name: Some("mobile".into()),
            key_material: Some(KeyMaterial::new(FIXTURE_SECRET)),
            ..Default::default()
        },
        ChangeKind::Revoked => KeyFields {
            key_name: Some("mobile".into()),
            ..Default::default()
        },
    };

    let event = build_event(kind, &identity(), &fields).unwrap();
    Arc::new(
        DeliveryEnvelope::builder()
            .request_id(RequestId::new())
            .event(event)
            .build()
            .unwrap(),
    )
}
