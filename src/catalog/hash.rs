//! Content fingerprinting over normalized payloads.
//!
//! Sources decorate records with volatile metadata (etags, view timestamps)
//! that changes on every fetch even when the content is identical. Hashing
//! the raw response would make every re-fetch look modified, so the
//! fingerprint is computed over a normalized form instead.

use sha2::{Digest, Sha256};

/// Top-level payload fields excluded from the fingerprint.
///
/// This is the stable normalization rule: a field belongs here iff the
/// source rewrites it on access or delivery without the underlying content
/// changing. Extending this list changes every stored hash, so additions
/// ride a catalog schema bump.
pub const VOLATILE_FIELDS: &[&str] = &[
    "etag",
    "updated",
    "updatedTime",
    "viewedByMeTime",
    "lastViewedByMeTime",
    "modifiedByMeTime",
    "thumbnailLink",
    "webViewLink",
    "webContentLink",
];

/// Compute the deterministic content fingerprint of a raw payload.
///
/// The payload is serialized with volatile top-level fields removed;
/// object keys serialize in sorted order (the default `serde_json` map is
/// ordered), so equal content always yields equal bytes. The digest is
/// SHA-256, hex encoded.
pub fn content_fingerprint(payload: &serde_json::Value) -> String {
    let normalized = normalize(payload);
    let bytes = serde_json::to_vec(&normalized).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

fn normalize(payload: &serde_json::Value) -> serde_json::Value {
    match payload {
        serde_json::Value::Object(map) => {
            let mut cleaned = serde_json::Map::new();
            for (key, value) in map {
                if VOLATILE_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                cleaned.insert(key.clone(), value.clone());
            }
            serde_json::Value::Object(cleaned)
        }
        other => other.clone(),
    }
}
