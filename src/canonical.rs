//! Canonicalisation for `content_hash`: a pure function over a document's
//! JSON content, used for change detection (§4.2, P6). Sorts object keys
//! recursively, normalises number formatting, and strips `$comment`-like
//! fields, per the specification's design notes.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Produces a canonical string form of `content` suitable for hashing.
/// Object keys are sorted (via `serde_json::Map`'s BTree ordering when
/// built through [`canonicalize`]), numbers are rendered through their
/// shortest round-tripping form, and keys starting with `$comment` are
/// dropped.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                if key.starts_with("$comment") {
                    continue;
                }
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => {
            // Re-parse through f64 when it has no exact integer
            // representation, otherwise keep integers exact.
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::Number(n.clone()))
            } else {
                Value::Number(n.clone())
            }
        }
        other => other.clone(),
    }
}

/// Computes a content hash over the canonical form. Two documents with
/// byte-identical canonicalised content always produce the same hash, and
/// vice versa — this is the `content_hash` the Harvester uses for change
/// detection and that the SpecStore uses to classify `new`/`unchanged`/
/// `updated` outcomes.
pub fn content_hash(value: &Value) -> String {
    let canonical = canonicalize(value);
    // compact, stable serialisation: BTreeMap ordering inside `canonicalize`
    // plus serde_json's deterministic array/scalar rendering.
    let bytes = serde_json::to_vec(&canonical).expect("canonical value always serializes");
    let digest = Sha256::digest(&bytes);
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn comment_fields_are_stripped() {
        let a = json!({"a": 1, "$comment": "ignored"});
        let b = json!({"a": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn differing_content_differs() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_is_deterministic() {
        let v = json!({"nested": {"z": [3, 2, 1], "a": true}});
        assert_eq!(content_hash(&v), content_hash(&v));
    }
}
