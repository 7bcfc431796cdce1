// Canonical hashing helpers shared by every crate.
//
// Canonical JSON: object keys sorted at every depth, no whitespace.

use serde::Serialize;
use serde_json::{Map, Value};
use sha3::{Digest, Sha3_256, Sha3_512};

pub fn sha3_256_hex(data: &[u8]) -> String {
    hex::encode(Sha3_256::digest(data))
}

pub fn sha3_512_hex(data: &[u8]) -> String {
    hex::encode(Sha3_512::digest(data))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, field) in fields {
                sorted.insert(key, sort_keys(field));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Serialize with sorted keys and no insignificant whitespace.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_string(&sort_keys(tree))
}

/// SHA3-512 over the canonical JSON of `value`.
pub fn canonical_sha3_512<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha3_512_hex(canonical_json(value)?.as_bytes()))
}

/// SHA3-256 over the canonical JSON of `value`.
pub fn canonical_sha3_256<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha3_256_hex(canonical_json(value)?.as_bytes()))
}
