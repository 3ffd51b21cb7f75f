//! Content hashing and structural diffing for reservation documents.
//!
//! The hash is a SHA-256 over a canonical JSON form: object keys sorted
//! recursively, array order preserved, and a fixed set of volatile
//! fields excluded so bookkeeping churn never looks like a material
//! change. The diff reports every top-level key whose canonical form
//! differs, over the same volatile exclusions. Both functions are pure.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Fields excluded from hashing and diffing.
///
/// These change on every write or track enrichment bookkeeping; none of
/// them represents material reservation content.
pub const VOLATILE_FIELDS: &[&str] = &[
    "created_at",
    "updated_at",
    "content_hash",
    "enrichment_state",
    "enriched_at",
];

/// A single changed key in a document diff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Canonicalized previous value (null when the key was absent).
    pub from: Value,
    /// Canonicalized new value (null when the key was removed).
    pub to: Value,
}

/// Recursively sort object keys; array order is preserved.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Strip volatile fields from a top-level document object.
fn strip_volatile(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let filtered: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !VOLATILE_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(filtered)
        }
        other => other.clone(),
    }
}

/// Compute the deterministic content hash of a document.
///
/// Stable across key ordering and volatile-field churn; two documents
/// with the same material content always hash identically.
#[must_use]
pub fn content_hash(document: &Value) -> String {
    let canonical = canonicalize(&strip_volatile(document));
    let serialized = canonical.to_string();
    let digest = Sha256::digest(serialized.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Report every top-level key whose canonical value differs.
///
/// Keys absent on one side appear with a null `from`/`to`. Volatile
/// fields are ignored on both sides.
#[must_use]
pub fn diff_documents(before: &Value, after: &Value) -> BTreeMap<String, FieldDiff> {
    let before = canonicalize(&strip_volatile(before));
    let after = canonicalize(&strip_volatile(after));

    let empty = Map::new();
    let before_map = before.as_object().unwrap_or(&empty);
    let after_map = after.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = before_map.keys().chain(after_map.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut diff = BTreeMap::new();
    for key in keys {
        let from = before_map.get(key).cloned().unwrap_or(Value::Null);
        let to = after_map.get(key).cloned().unwrap_or(Value::Null);
        if from != to {
            diff.insert(key.clone(), FieldDiff { from, to });
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_stable_across_key_order() {
        let a = json!({"guest": "Ada", "status": "confirmed", "rooms": 2});
        let b = json!({"rooms": 2, "status": "confirmed", "guest": "Ada"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_hash_sorts_nested_keys() {
        let a = json!({"breakdown": {"base": 100, "vat": 21}});
        let b = json!({"breakdown": {"vat": 21, "base": 100}});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_hash_preserves_array_order() {
        let a = json!({"notes": ["first", "second"]});
        let b = json!({"notes": ["second", "first"]});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_hash_ignores_volatile_fields() {
        let a = json!({"guest": "Ada", "updated_at": "2024-01-01T00:00:00Z", "content_hash": "x"});
        let b = json!({"guest": "Ada", "updated_at": "2025-05-05T00:00:00Z", "enrichment_state": "completed"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_diff_reports_changed_keys_only() {
        let before = json!({"guest": "Ada", "status": "confirmed", "to_pay": "100"});
        let after = json!({"guest": "Ada", "status": "checked_in", "to_pay": "120"});
        let diff = diff_documents(&before, &after);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff["status"].from, json!("confirmed"));
        assert_eq!(diff["status"].to, json!("checked_in"));
        assert_eq!(diff["to_pay"].to, json!("120"));
        assert!(!diff.contains_key("guest"));
    }

    #[test]
    fn test_diff_handles_added_and_removed_keys() {
        let before = json!({"old": 1});
        let after = json!({"new": 2});
        let diff = diff_documents(&before, &after);
        assert_eq!(diff["old"].from, json!(1));
        assert_eq!(diff["old"].to, Value::Null);
        assert_eq!(diff["new"].from, Value::Null);
        assert_eq!(diff["new"].to, json!(2));
    }

    #[test]
    fn test_diff_ignores_volatile_fields() {
        let before = json!({"guest": "Ada", "updated_at": "a"});
        let after = json!({"guest": "Ada", "updated_at": "b"});
        assert!(diff_documents(&before, &after).is_empty());
    }

    #[test]
    fn test_identical_documents_have_empty_diff_and_equal_hash() {
        let doc = json!({"guest": "Ada", "payments": [{"amount": "60"}]});
        assert_eq!(content_hash(&doc), content_hash(&doc.clone()));
        assert!(diff_documents(&doc, &doc.clone()).is_empty());
    }
}
