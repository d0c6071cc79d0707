//! Identity types for Periscope queries

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.finalize().into()
}

/// Deterministic digest identifying a logically unique query.
///
/// Always 64 lowercase hex characters. Two queries with the same device,
/// query type and parameters produce the same fingerprint regardless of the
/// order their fields arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a JSON value by hashing its canonical encoding.
    pub fn of_value(value: &Value) -> Self {
        let canonical = canonical_json(value);
        Self(hex::encode(compute_content_hash(canonical.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache key under the given namespace: `<namespace>.query.<fingerprint>`.
    pub fn cache_key(&self, namespace: &str) -> String {
        format!("{}.query.{}", namespace, self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a JSON value with object keys sorted at every depth.
///
/// Independent of whether `serde_json` was built with `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                if let Some(inner) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = Fingerprint::of_value(&json!({"a": 1}));
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_fingerprint_differs_for_different_values() {
        let a = Fingerprint::of_value(&json!({"target": "192.0.2.0/24"}));
        let b = Fingerprint::of_value(&json!({"target": "192.0.2.0/25"}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_key_format() {
        let fp = Fingerprint::of_value(&json!({}));
        let key = fp.cache_key("periscope");
        assert!(key.starts_with("periscope.query."));
        assert!(key.ends_with(fp.as_str()));
    }
}
