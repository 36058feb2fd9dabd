//! Content-derived identifiers.
//!
//! The same inputs always produce the same id, which is what lets idea inserts
//! be replayed as "insert if absent". Not a security boundary.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 over the NUL-joined parts, first 16 bytes laid out as a UUID.
pub fn deterministic_id(parts: &[&str]) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("\0").as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Idempotency key for an idea row.
pub fn idea_id(publication_id: Uuid, title: &str, angle: &str) -> Uuid {
    deterministic_id(&[&publication_id.to_string(), title, angle])
}
