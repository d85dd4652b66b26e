//! Content hashes.
//!
//! Model fingerprints and artifact hashes are SHA-256 over a canonical JSON
//! encoding: object keys in byte order, no insignificant whitespace. Key
//! order in the source value never changes a digest.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Compact JSON with every object's keys sorted, recursively.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut tree = serde_json::to_value(value)?;
    order_keys(&mut tree);
    serde_json::to_string(&tree)
}

// Maps preserve insertion order, so sorting means re-inserting.
fn order_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            for (key, mut child) in entries {
                order_keys(&mut child);
                map.insert(key, child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(order_keys),
        _ => {}
    }
}

pub fn compute_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    canonical_json(value).map(|text| sha256_hex(text.as_bytes()))
}

/// Identifies one template render. Any change to the template, its pinned
/// version, the model or the engine yields a new hash.
pub fn compute_job_hash(template_name: &str, version_id: &str, model_fingerprint: &str, engine_version: &str) -> String {
    let parts = [template_name, version_id, model_fingerprint, engine_version];
    sha256_hex(parts.join(":").as_bytes())
}
