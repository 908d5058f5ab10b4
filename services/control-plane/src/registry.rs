//! API directory and deployment topology.
//!
//! The service consumes both through traits so other backends can be
//! plugged in. [`StaticRegistry`] serves both from a TOML file:
//!
//! ```toml
//! [[apis]]
//! handle = "orders-api"
//! org_id = "org1"
//! api_id = "api_01HV4Z2WQXKJNM8GPQY6VBKC3D"
//!
//! [[apis.deployments]]
//! gateway_id = "gw-eu-1"
//! endpoint = "https://gw-eu-1.internal:9443"
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use keyprop_broadcast::DeploymentTarget;
use keyprop_events::ApiIdentity;
use keyprop_id::{ApiHandle, ApiId, GatewayId, OrgId};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("API '{handle}' not found in org '{org_id}'")]
    NotFound { handle: ApiHandle, org_id: OrgId },

    #[error("API directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("no topology for API {0}")]
    NotFound(ApiId),

    #[error("deployment topology unavailable: {0}")]
    Unavailable(String),
}

/// Resolves human-facing handles to API identities.
#[async_trait]
pub trait ApiDirectory: Send + Sync {
    async fn resolve(&self, handle: &ApiHandle, org_id: &OrgId)
        -> Result<ApiIdentity, DirectoryError>;

    /// Readiness check. Backends without a remote dependency are always ready.
    async fn health_check(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}

/// Lists the gateways currently hosting an API.
///
/// An empty list is a valid answer: the API exists but is deployed nowhere.
#[async_trait]
pub trait DeploymentTopology: Send + Sync {
    async fn list_targets(&self, api: &ApiIdentity)
        -> Result<Vec<DeploymentTarget>, TopologyError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("API '{handle}' is registered twice in org '{org_id}'")]
    DuplicateApi { handle: ApiHandle, org_id: OrgId },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    apis: Vec<ApiEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApiEntry {
    handle: ApiHandle,
    org_id: OrgId,
    api_id: ApiId,
    #[serde(default)]
    deployments: Vec<DeploymentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeploymentEntry {
    gateway_id: GatewayId,
    endpoint: String,
}

#[derive(Debug, Clone)]
struct Registered {
    identity: ApiIdentity,
    targets: Vec<DeploymentTarget>,
}

/// File-backed directory and topology.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    apis: HashMap<(OrgId, ApiHandle), Registered>,
}

impl StaticRegistry {
    /// Load a registry from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse a registry from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(raw)?;
        let mut apis = HashMap::with_capacity(file.apis.len());

        for entry in file.apis {
            let key = (entry.org_id.clone(), entry.handle.clone());
            if apis.contains_key(&key) {
                return Err(RegistryError::DuplicateApi {
                    handle: entry.handle,
                    org_id: entry.org_id,
                });
            }

            let targets = entry
                .deployments
                .into_iter()
                .map(|d| {
                    DeploymentTarget::new(d.gateway_id)
                        .with_routing(serde_json::json!({ "endpoint": d.endpoint }))
                })
                .collect();

            apis.insert(
                key,
                Registered {
                    identity: ApiIdentity {
                        handle: entry.handle,
                        api_id: entry.api_id,
                        org_id: entry.org_id,
                    },
                    targets,
                },
            );
        }

        Ok(Self { apis })
    }

    /// Number of registered APIs.
    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }
}

#[async_trait]
impl ApiDirectory for StaticRegistry {
    async fn resolve(
        &self,
        handle: &ApiHandle,
        org_id: &OrgId,
    ) -> Result<ApiIdentity, DirectoryError> {
        self.apis
            .get(&(org_id.clone(), handle.clone()))
            .map(|r| r.identity.clone())
            .ok_or_else(|| DirectoryError::NotFound {
                handle: handle.clone(),
                org_id: org_id.clone(),
            })
    }
}

#[async_trait]
impl DeploymentTopology for StaticRegistry {
    async fn list_targets(
        &self,
        api: &ApiIdentity,
    ) -> Result<Vec<DeploymentTarget>, TopologyError> {
        match self.apis.get(&(api.org_id.clone(), api.handle.clone())) {
            Some(registered) if registered.identity.api_id == api.api_id => {
                Ok(registered.targets.clone())
            }
            _ => Err(TopologyError::NotFound(api.api_id)),
        }
    }
}
