//! Content hashing for schemas, plans and artifacts.
//!
//! All hashes are SHA-256 rendered as lowercase hex, so fingerprints stay
//! stable across processes and can be compared as plain strings.

use serde::Serialize;
use sha2::{Digest as _, Sha256};

/// Hash algorithm identifier recorded next to fingerprints.
pub const HASH_ALGORITHM: &str = "SHA-256";

pub fn hash_bytes(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    format!("{hash:x}")
}

/// Hash the canonical JSON form of a value.
///
/// Struct fields serialize in declaration order and maps in this crate are
/// insertion-ordered, so equal values always produce equal hashes.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> String {
    // Only string-keyed data is hashed here, which always serializes.
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hash_bytes(&bytes)
}
