//! Change event definitions.
//!
//! One variant per API-key lifecycle change. Payload structs hold exactly
//! the fields the receiving gateway needs for that change and nothing more.

use chrono::{DateTime, Utc};
use keyprop_id::{ApiHandle, ApiId, KeyName, OrgId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    pub const API_KEY_CREATED: &str = "api_key.created";
    pub const API_KEY_UPDATED: &str = "api_key.updated";
    pub const API_KEY_REVOKED: &str = "api_key.revoked";
}

/// Current schema version of the change event payloads.
pub const EVENT_VERSION: i32 = 1;

// =============================================================================
// Identity and Secrets
// =============================================================================

/// A resolved API identity.
///
/// Resolved once per operation from the human-facing handle and never
/// changed afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiIdentity {
    /// Stable, org-scoped, human-facing handle.
    pub handle: ApiHandle,

    /// Internal canonical identifier.
    pub api_id: ApiId,

    /// Owning organization.
    pub org_id: OrgId,
}

/// Cleartext API-key material.
///
/// Serializes as a plain string because the gateway needs the cleartext to
/// hash it. `Debug` is redacted and there is no `Display`, so the material
/// cannot end up in a log line through formatting.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    /// Wraps raw key material.
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    /// Returns the cleartext. Callers must not log or persist it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the material is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// Operations a key is allowed to call.
///
/// Only total scope exists today; per-operation scoping is not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationScope {
    #[default]
    AllOperations,
}

// =============================================================================
// Payloads
// =============================================================================

/// Payload for `api_key.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyCreatedPayload {
    pub api: ApiIdentity,
    pub name: KeyName,
    pub display_name: String,
    pub key_material: KeyMaterial,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref_id: Option<String>,
    pub operation_scope: OperationScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload for `api_key.updated` (rotation or expiry change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyUpdatedPayload {
    pub api: ApiIdentity,
    pub key_name: KeyName,
    pub key_material: KeyMaterial,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload for `api_key.revoked`.
///
/// Deliberately has no key-material field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyRevokedPayload {
    pub api: ApiIdentity,
    pub key_name: KeyName,
}

// =============================================================================
// Change Event
// =============================================================================

/// Discriminant of a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Revoked,
}

impl ChangeKind {
    /// Wire name of the event type for this kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeKind::Created => event_types::API_KEY_CREATED,
            ChangeKind::Updated => event_types::API_KEY_UPDATED,
            ChangeKind::Revoked => event_types::API_KEY_REVOKED,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_type())
    }
}

/// An immutable API-key change destined for every gateway hosting the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum ChangeEvent {
    #[serde(rename = "api_key.created")]
    Created(ApiKeyCreatedPayload),

    #[serde(rename = "api_key.updated")]
    Updated(ApiKeyUpdatedPayload),

    #[serde(rename = "api_key.revoked")]
    Revoked(ApiKeyRevokedPayload),
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Created(_) => ChangeKind::Created,
            ChangeEvent::Updated(_) => ChangeKind::Updated,
            ChangeEvent::Revoked(_) => ChangeKind::Revoked,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind().event_type()
    }

    /// The API this change applies to.
    pub fn api(&self) -> &ApiIdentity {
        match self {
            ChangeEvent::Created(p) => &p.api,
            ChangeEvent::Updated(p) => &p.api,
            ChangeEvent::Revoked(p) => &p.api,
        }
    }

    /// The key this change applies to.
    pub fn key_name(&self) -> &KeyName {
        match self {
            ChangeEvent::Created(p) => &p.name,
            ChangeEvent::Updated(p) => &p.key_name,
            ChangeEvent::Revoked(p) => &p.key_name,
        }
    }

    /// Returns true if the event carries cleartext key material.
    pub fn carries_key_material(&self) -> bool {
        !matches!(self, ChangeEvent::Revoked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ApiIdentity {
        ApiIdentity {
            handle: ApiHandle::parse("orders-api").unwrap(),
            api_id: ApiId::new(),
            org_id: OrgId::parse("org1").unwrap(),
        }
    }

    #[test]
    fn test_key_material_debug_is_redacted() {
        let material = KeyMaterial::new("sk_live_supersecret");
        let rendered = format!("{material:?}");
        assert_eq!(rendered, "KeyMaterial(<redacted>)");
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn test_event_debug_never_shows_material() {
        let event = ChangeEvent::Updated(ApiKeyUpdatedPayload {
            api: identity(),
            key_name: KeyName::parse("mobile").unwrap(),
            key_material: KeyMaterial::new("sk_live_supersecret"),
            expires_at: None,
        });
        assert!(!format!("{event:?}").contains("supersecret"));
    }

    #[test]
    fn test_change_event_wire_shape() {
        let event = ChangeEvent::Revoked(ApiKeyRevokedPayload {
            api: identity(),
            key_name: KeyName::parse("mobile").unwrap(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "api_key.revoked");
        assert_eq!(json["payload"]["key_name"], "mobile");
        assert_eq!(json["payload"]["api"]["handle"], "orders-api");
        assert_eq!(json["payload"]["api"]["org_id"], "org1");

        let parsed: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_created_payload_carries_scope_literal() {
        let event = ChangeEvent::Created(ApiKeyCreatedPayload {
            api: identity(),
            name: KeyName::parse("mobile").unwrap(),
            display_name: "Mobile".to_string(),
            key_material: KeyMaterial::new("sk_1"),
            external_ref_id: None,
            operation_scope: OperationScope::default(),
            expires_at: None,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["operation_scope"], "all_operations");
        assert_eq!(json["payload"]["key_material"], "sk_1");
        assert!(json["payload"].get("external_ref_id").is_none());
        assert!(event.carries_key_material());
    }

    #[test]
    fn test_revoked_payload_rejects_smuggled_material() {
        let json = serde_json::json!({
            "event_type": "api_key.revoked",
            "payload": {
                "api": serde_json::to_value(identity()).unwrap(),
                "key_name": "mobile",
                "key_material": "sk_1"
            }
        });
        assert!(serde_json::from_value::<ChangeEvent>(json).is_err());
    }

    #[test]
    fn test_change_kind_event_types() {
        assert_eq!(ChangeKind::Created.to_string(), "api_key.created");
        assert_eq!(ChangeKind::Updated.event_type(), "api_key.updated");
        assert_eq!(ChangeKind::Revoked.event_type(), "api_key.revoked");
    }
}
