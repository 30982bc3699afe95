//! Concurrency token computation.

use uuid::Uuid;

use crate::error::Result;

/// Token for a new write: lowercase hex BLAKE3 digest of the serialized
/// data keyed with a per-write nonce. Every successful save gets a fresh
/// token, including one that leaves `data` unchanged.
pub fn next(data: &serde_json::Value) -> Result<String> {
    let bytes = serde_json::to_vec(data)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(&bytes);
    Ok(hasher.finalize().to_hex().to_string())
}
