//! Event construction from a logical intent.
//!
//! [`build_event`] is the single place where raw request fields become a
//! [`ChangeEvent`]. It reports every violated field at once so the caller
//! can surface a complete list.

use chrono::{DateTime, Utc};
use keyprop_id::KeyName;
use serde::Serialize;
use thiserror::Error;

use crate::types::{
    ApiIdentity, ApiKeyCreatedPayload, ApiKeyRevokedPayload, ApiKeyUpdatedPayload, ChangeEvent,
    ChangeKind, KeyMaterial, OperationScope,
};

/// The lifecycle change being requested.
pub type ChangeIntent = ChangeKind;

/// Raw, unvalidated inputs for [`build_event`].
///
/// Which fields are required or forbidden depends on the intent.
#[derive(Debug, Clone, Default)]
pub struct KeyFields {
    /// Key name for a new key (`Created`).
    pub name: Option<String>,

    /// Human-facing name for a new key; defaults to `name`.
    pub display_name: Option<String>,

    /// Existing key name (`Updated`, `Revoked`).
    pub key_name: Option<String>,

    /// Cleartext key material (`Created`, `Updated`).
    pub key_material: Option<KeyMaterial>,

    /// Caller-side reference for a new key.
    pub external_ref_id: Option<String>,

    /// Operation scope for a new key; defaults to all operations.
    pub operation_scope: Option<OperationScope>,

    /// Optional expiry (`Created`, `Updated`).
    pub expires_at: Option<DateTime<Utc>>,
}

/// A single invalid input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// The inputs could not form a valid event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} request: {}", summarize(.violations))]
pub struct ValidationError {
    pub kind: ChangeKind,
    pub violations: Vec<FieldViolation>,
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects violations while reading fields.
struct Checker {
    violations: Vec<FieldViolation>,
}

impl Checker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    fn violation(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    fn key_name(&mut self, field: &'static str, value: Option<&str>) -> Option<KeyName> {
        match value {
            None => {
                self.violation(field, "is required");
                None
            }
            Some(raw) if raw.trim().is_empty() => {
                self.violation(field, "must not be empty");
                None
            }
            Some(raw) => match KeyName::parse(raw) {
                Ok(name) => Some(name),
                Err(e) => {
                    self.violation(field, e.to_string());
                    None
                }
            },
        }
    }

    fn key_material(&mut self, value: Option<&KeyMaterial>) -> Option<KeyMaterial> {
        match value {
            None => {
                self.violation("key_material", "is required");
                None
            }
            Some(m) if m.is_blank() => {
                self.violation("key_material", "must not be empty");
                None
            }
            Some(m) => Some(m.clone()),
        }
    }

    fn forbid<T>(&mut self, field: &'static str, value: &Option<T>, kind: ChangeKind) {
        if value.is_some() {
            self.violation(field, format!("is not accepted for {kind}"));
        }
    }

    fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    fn into_error(self, kind: ChangeKind) -> ValidationError {
        ValidationError {
            kind,
            violations: self.violations,
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a change event from an intent, a resolved identity, and raw fields.
///
/// - `Created` requires `name` and `key_material`.
/// - `Updated` requires `key_name` and `key_material`.
/// - `Revoked` requires `key_name` and rejects `key_material` and `expires_at`.
pub fn build_event(
    intent: ChangeIntent,
    identity: &ApiIdentity,
    fields: &KeyFields,
) -> Result<ChangeEvent, ValidationError> {
    let mut check = Checker::new();

    match intent {
        ChangeKind::Created => {
            let name = check.key_name("name", fields.name.as_deref());
            let key_material = check.key_material(fields.key_material.as_ref());
            check.forbid("key_name", &fields.key_name, intent);

            match (name, key_material) {
                (Some(name), Some(key_material)) if check.is_clean() => {
                    let display_name = non_blank(fields.display_name.as_ref())
                        .unwrap_or_else(|| name.to_string());

                    Ok(ChangeEvent::Created(ApiKeyCreatedPayload {
                        api: identity.clone(),
                        name,
                        display_name,
                        key_material,
                        external_ref_id: non_blank(fields.external_ref_id.as_ref()),
                        operation_scope: fields.operation_scope.unwrap_or_default(),
                        expires_at: fields.expires_at,
                    }))
                }
                _ => Err(check.into_error(intent)),
            }
        }
        ChangeKind::Updated => {
            let key_name = check.key_name("key_name", fields.key_name.as_deref());
            let key_material = check.key_material(fields.key_material.as_ref());

            match (key_name, key_material) {
                (Some(key_name), Some(key_material)) if check.is_clean() => {
                    Ok(ChangeEvent::Updated(ApiKeyUpdatedPayload {
                        api: identity.clone(),
                        key_name,
                        key_material,
                        expires_at: fields.expires_at,
                    }))
                }
                _ => Err(check.into_error(intent)),
            }
        }
        ChangeKind::Revoked => {
            let key_name = check.key_name("key_name", fields.key_name.as_deref());
            check.forbid("key_material", &fields.key_material, intent);
            check.forbid("expires_at", &fields.expires_at, intent);

            match key_name {
                Some(key_name) if check.is_clean() => {
                    Ok(ChangeEvent::Revoked(ApiKeyRevokedPayload {
                        api: identity.clone(),
                        key_name,
                    }))
                }
                _ => Err(check.into_error(intent)),
            }
        }
    }
}
