//! Canonical forms — candidate names, JSON encoding and state hashes
//!
//! Everything that two nodes must agree on byte-for-byte goes through this
//! module: the case rule applied to user-submitted candidate names, the
//! canonical JSON text of any wire value, and the SHA-256 digests derived
//! from it.
//!
//! # Guarantees
//!
//! - **Deterministic**: same input always produces the same output
//! - **Key-order independent**: object keys are emitted in sorted order
//!   regardless of how the value was built
//! - **Idempotent**: `normalize_name(normalize_name(x)) == normalize_name(x)`

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Placeholder used when a digest must exclude itself.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ── Candidate names ───────────────────────────────────────

/// Canonical matching key for a candidate name.
///
/// Surrounding whitespace is dropped and the name is lowercased, so
/// `" TUAN "`, `"tuan"` and `"Tuan"` all select the same candidate. Stored
/// names keep their deployed spelling; only the comparison key is folded.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Case-insensitive candidate-name comparison under [`normalize_name`].
pub fn names_match(stored: &str, submitted: &str) -> bool {
    normalize_name(stored) == normalize_name(submitted)
}

// ── Canonical JSON ────────────────────────────────────────

/// Serialize any value to its canonical JSON text.
pub fn to_canonical_json<T: serde::Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::Validation(format!("value is not JSON-encodable: {}", e)))?;
    Ok(canonical_json(&json))
}

/// Render a JSON value with object keys sorted at every depth and no
/// insignificant whitespace.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings are escaped by serde_json itself
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ── SHA-256 ───────────────────────────────────────────────

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a value's canonical JSON text.
pub fn hash_canonical<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(sha256_hex(to_canonical_json(value)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_folds_case_and_whitespace() {
        assert_eq!(normalize_name("Tuan"), "tuan");
        assert_eq!(normalize_name("  TUAN\t"), "tuan");
        assert!(names_match("Tuan", "tUaN"));
        assert!(!names_match("Tuan", "Thanh"));
    }

    #[test]
    fn test_normalize_name_idempotent() {
        for name in ["Dung", " cuong ", "THANH", "Đức"] {
            let once = normalize_name(name);
            assert_eq!(normalize_name(&once), once);
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":{"d":[1,2],"c":null}}"#).unwrap();
        assert_eq!(canonical_json(&a), r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let v = serde_json::json!({"k\"ey": "va\"lue"});
        assert_eq!(canonical_json(&v), r#"{"k\"ey":"va\"lue"}"#);
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_canonical_ignores_construction_order() {
        let mut first = serde_json::Map::new();
        first.insert("x".into(), serde_json::json!(1));
        first.insert("y".into(), serde_json::json!(2));
        let mut second = serde_json::Map::new();
        second.insert("y".into(), serde_json::json!(2));
        second.insert("x".into(), serde_json::json!(1));
        assert_eq!(
            hash_canonical(&serde_json::Value::Object(first)).unwrap(),
            hash_canonical(&serde_json::Value::Object(second)).unwrap()
        );
    }

    #[test]
    fn test_hash_determinism_100_iterations() {
        let v = serde_json::json!({"candidates": [{"name": "Tuan", "voteCount": 1}], "voters": ["addrA"]});
        let first = hash_canonical(&v).unwrap();
        for i in 0..100 {
            assert_eq!(first, hash_canonical(&v).unwrap(), "Non-determinism at iteration {}", i);
        }
    }
}
