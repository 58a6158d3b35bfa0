//! The single normalization codec applied at the store boundary.
//!
//! Primary keys and indexed payload fields become strings, boolean-typed
//! fields become the integers 0/1 (the store's indexing needs one comparable
//! primitive type per field, and the engine's truthiness checks assume
//! integer semantics). Server payloads also arrive with booleans spelled as
//! JSON bools or the strings `"true"`/`"false"`; all three spellings
//! collapse here.

use serde_json::Value;

use crate::store::traits::FlagField;
use crate::types::StoreSchema;

/// Normalize a payload's primary key to a string, if present.
pub fn normalize_key(data: &Value, primary_key: &str) -> Option<String> {
    match data.get(primary_key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a boolean-ish value to 0/1. Accepts JSON bools, the strings
/// `"true"`/`"false"`, and numbers (nonzero is truthy); anything else is
/// falsy.
pub fn flag_to_int(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        Value::String(s) => i64::from(s == "true"),
        Value::Number(n) => i64::from(n.as_f64().unwrap_or(0.0) != 0.0),
        _ => 0,
    }
}

/// Rewrite the schema's boolean fields in-place to 0/1 integers and its
/// indexed payload fields to strings. Index lookups compare one canonical
/// representation per field; server payloads carry ids as numbers where
/// local writes use strings, and both must hit the same index entry.
pub fn normalize_fields(data: &mut Value, schema: &StoreSchema) {
    let Some(map) = data.as_object_mut() else {
        return;
    };
    for field in &schema.bool_fields {
        if let Some(value) = map.get(field) {
            let normalized = flag_to_int(value);
            map.insert(field.clone(), Value::from(normalized));
        }
    }
    for field in &schema.indices {
        // flag names address the lifecycle flags, not the payload
        if FlagField::parse(field).is_some() || schema.bool_fields.contains(field) {
            continue;
        }
        if let Some(Value::Number(n)) = map.get(field) {
            let text = n.to_string();
            map.insert(field.clone(), Value::from(text));
        }
    }
}

/// Normalize a server payload for storage: primary key stringified in-place,
/// boolean and indexed fields coerced. Returns the normalized key, or `None`
/// when the payload has no usable primary key.
pub fn normalize_payload(data: &mut Value, schema: &StoreSchema) -> Option<String> {
    let key = normalize_key(data, &schema.primary_key)?;
    if let Some(map) = data.as_object_mut() {
        map.insert(schema.primary_key.clone(), Value::from(key.clone()));
    }
    normalize_fields(data, schema);
    Some(key)
}

/// Per-top-level-field structural comparison between two payloads.
///
/// `serde_json::Value` map equality is key-order independent, so two
/// payloads whose nested objects merely serialize in a different key order
/// compare equal here (the redundant-callback suppression this feeds is
/// meant to fire only on real content changes).
pub fn payloads_equal(a: &Value, b: &Value) -> bool {
    match (a.as_object(), b.as_object()) {
        (Some(a_map), Some(b_map)) => {
            if a_map.len() != b_map.len() {
                return false;
            }
            a_map
                .iter()
                .all(|(field, value)| b_map.get(field) == Some(value))
        }
        _ => a == b,
    }
}
