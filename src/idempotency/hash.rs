//! Canonical payload hashing
//!
//! Two semantically identical payloads must hash identically regardless of
//! JSON key order, so object keys are sorted recursively before hashing.
//! Array order is preserved (it is semantically significant).

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Produce the canonical serialization of a JSON payload
pub fn canonical_json(value: &Value) -> String {
    normalize(value).to_string()
}

/// SHA-256 over the canonical serialization, hex-encoded
pub fn request_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            // BTreeMap iteration gives sorted keys
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), normalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = json!({"ids": [1, 2, 3]});
        let b = json!({"ids": [3, 2, 1]});
        assert_ne!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn test_different_values_hash_differently() {
        let a = json!({"amount": "100.00"});
        let b = json!({"amount": "100.01"});
        assert_ne!(request_hash(&a), request_hash(&b));
    }

    #[test]
    fn test_canonical_form_is_sorted() {
        let v: Value = serde_json::from_str(r#"{"z": 1, "a": 2}"#).unwrap();
        assert_eq!(canonical_json(&v), r#"{"a":2,"z":1}"#);
    }
}
