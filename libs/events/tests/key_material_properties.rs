//! Property tests for key-material handling.
//!
//! A revocation must never serialize key material, and no event may leak
//! material through `Debug`, whatever the caller supplies.

use chrono::{TimeZone, Utc};
use keyprop_events::{
    build_event, ApiIdentity, ChangeKind, DeliveryEnvelope, KeyFields, KeyMaterial,
};
use keyprop_id::{ApiHandle, ApiId, OrgId, RequestId};
use proptest::prelude::*;

fn label() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9 ._-]{0,30}[a-z0-9]"
}

fn material() -> impl Strategy<Value = String> {
    "sk_[A-Za-z0-9]{16,48}"
}

fn identity() -> impl Strategy<Value = ApiIdentity> {
    (label(), label()).prop_map(|(handle, org)| ApiIdentity {
        handle: ApiHandle::parse(handle).unwrap(),
        api_id: ApiId::new(),
        org_id: OrgId::parse(org).unwrap(),
    })
}

fn collect_keys(value: &serde_json::Value, keys: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                keys.push(k.clone());
                collect_keys(v, keys);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                collect_keys(v, keys);
            }
        }
        _ => {}
    }
}

proptest! {
    #[test]
    fn revoked_envelopes_never_contain_key_material(
        identity in identity(),
        key_name in label(),
    ) {
        let event = build_event(
            ChangeKind::Revoked,
            &identity,
            &KeyFields { key_name: Some(key_name), ..Default::default() },
        ).unwrap();
        prop_assert!(!event.carries_key_material());

        let envelope = DeliveryEnvelope::builder()
            .request_id(RequestId::new())
            .event(event)
            .build()
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&envelope.to_json_bytes().unwrap()).unwrap();

        let mut keys = Vec::new();
        collect_keys(&json, &mut keys);
        prop_assert!(!keys.iter().any(|k| k.contains("key_material")), "keys: {:?}", keys);
    }

    #[test]
    fn revoke_with_material_is_always_rejected(
        identity in identity(),
        key_name in label(),
        secret in material(),
    ) {
        let err = build_event(
            ChangeKind::Revoked,
            &identity,
            &KeyFields {
                key_name: Some(key_name),
                key_material: Some(KeyMaterial::new(secret.clone())),
                ..Default::default()
            },
        ).unwrap_err();

        prop_assert!(err.violations.iter().any(|v| v.field == "key_material"));
        prop_assert!(!err.to_string().contains(&secret));
    }

    #[test]
    fn debug_output_never_contains_material(
        identity in identity(),
        key_name in label(),
        secret in material(),
        created in any::<bool>(),
        expiry_secs in proptest::option::of(0i64..4_102_444_800),
    ) {
        let (kind, fields) = if created {
            (ChangeKind::Created, KeyFields {
                name: Some(key_name),
                key_material: Some(KeyMaterial::new(secret.clone())),
                expires_at: expiry_secs.and_then(|s| Utc.timestamp_opt(s, 0).single()),
                ..Default::default()
            })
        } else {
            (ChangeKind::Updated, KeyFields {
                key_name: Some(key_name),
                key_material: Some(KeyMaterial::new(secret.clone())),
                expires_at: expiry_secs.and_then(|s| Utc.timestamp_opt(s, 0).single()),
                ..Default::default()
            })
        };

        let event = build_event(kind, &identity, &fields).unwrap();
        prop_assert!(event.carries_key_material());
        let event_debug = format!("{event:?}");
        let fields_debug = format!("{fields:?}");
        prop_assert!(!event_debug.contains(&secret));
        prop_assert!(!fields_debug.contains(&secret));
    }
}
