//! Diagnostics support for Landau
//!
//! Produces a redacted diagnostics payload for support bundles: polling
//! settings, the daily call counters, update timestamps, and the raw
//! vendor payloads with credentials and identifiers masked.

use crate::coordinator::RefreshCoordinator;
use serde_json::{Value, json};

/// Keys whose values never leave the device unmasked
pub const REDACT_KEYS: [&str; 8] = [
    "customerID",
    "token",
    "asset",
    "asset_id",
    "bearer_token",
    "email",
    "username",
    "password",
];

const REDACTED: &str = "**REDACTED**";

/// Recursively mask the values of sensitive keys
pub fn redact(value: &Value, keys: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if keys.contains(&k.as_str()) {
                        (k.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (k.clone(), redact(v, keys))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact(v, keys)).collect()),
        _ => value.clone(),
    }
}

/// Redacted diagnostics payload for a coordinator
pub fn diagnostics_payload(coordinator: &RefreshCoordinator) -> Value {
    let counters = coordinator.counters();
    let snapshot = coordinator.snapshot();

    let info = json!({
        "update_interval_minutes": coordinator.config().polling.update_interval_minutes,
        "api": {
            "calls_today": counters.calls_total,
            "calls_failed_today": counters.calls_failed,
            "can_calls_today": counters.can_calls_total,
            "can_calls_failed_today": counters.can_calls_failed,
            "last_full_update": coordinator.last_full_update().map(|t| t.to_rfc3339()),
            "last_can_update": coordinator.last_can_update().map(|t| t.to_rfc3339()),
        },
        "raw_payload": {
            "customer_data": snapshot.customer_data,
            "can_bus_data": snapshot.can_bus_data,
        },
    });

    redact(&info, &REDACT_KEYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redact_masks_nested_keys() {
        let payload = json!({
            "email": "owner@example.com",
            "vehicles": [{"asset": "A-42", "chassisNumber": "CH123"}],
            "nested": {"token": "secret", "ok": 1}
        });
        let redacted = redact(&payload, &REDACT_KEYS);

        assert_eq!(redacted["email"], json!("**REDACTED**"));
        assert_eq!(redacted["vehicles"][0]["asset"], json!("**REDACTED**"));
        assert_eq!(redacted["vehicles"][0]["chassisNumber"], json!("CH123"));
        assert_eq!(redacted["nested"]["token"], json!("**REDACTED**"));
        assert_eq!(redacted["nested"]["ok"], json!(1));
    }

    #[test]
    fn redact_leaves_scalars_untouched() {
        assert_eq!(redact(&json!(42), &REDACT_KEYS), json!(42));
        assert_eq!(redact(&json!("x"), &REDACT_KEYS), json!("x"));
    }
}
