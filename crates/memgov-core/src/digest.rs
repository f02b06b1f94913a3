//! Canonical JSON normalization and SHA-256 digests.
//!
//! - Object keys ordered by UTF-16 code units (RFC 8785 §3.2.3)
//! - Integer-valued floats collapse to integers; NaN/Infinity are rejected
//! - `recall_hash` fingerprints an ordered recall result

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{GovernanceError, Result};
use crate::item::MemoryItem;

fn sort_keys_utf16(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), sort_keys_utf16(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys_utf16).collect()),
        other => other.clone(),
    }
}

fn normalize_value(value: &Value) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(Value::Object(normalized))
        }
        Value::Array(arr) => Ok(Value::Array(
            arr.iter().map(normalize_value).collect::<Result<Vec<_>>>()?,
        )),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n.clone())),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Err(GovernanceError::NonCanonical(
                "NaN/Infinity not permitted in canonical JSON".to_string(),
            )),
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Ok(Value::Number(serde_json::Number::from(f as i64)))
            }
            _ => Ok(Value::Number(n.clone())),
        },
        other => Ok(other.clone()),
    }
}

/// Convert a JSON value to canonical form: normalize numbers, sort keys, compact output.
pub fn canonical_json(value: &Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    Ok(serde_json::to_string(&sort_keys_utf16(&normalized))?)
}

/// SHA-256 hex digest of the canonical JSON form of `value`.
pub fn compute_digest(value: &Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// Serialize `value` and digest its canonical form.
pub fn digest_of<T: Serialize>(value: &T) -> Result<String> {
    compute_digest(&serde_json::to_value(value)?)
}

/// SHA-256 hex digest of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic fingerprint of an ordered recall result.
///
/// Order matters: the same items in a different order hash differently.
pub fn recall_hash(items: &[MemoryItem]) -> Result<String> {
    digest_of(&items)
}
