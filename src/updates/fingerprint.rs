//! Content fingerprinting for update identity.
//!
//! An update's identity is derived from its `metadata.json` bytes, not
//! generated: hash the bytes with SHA-256 and reshape the leading 16 bytes
//! of the digest into a UUID-formatted string.  Byte-identical metadata
//! always yields the same id, regardless of runtime version or upload time,
//! which is what lets a republished artifact keep its identity and lets
//! polling clients be recognised as up to date by content alone.

use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Reshape a hex SHA-256 digest into a UUID-formatted string
/// (`8-4-4-4-12` over the first 32 hex characters).
pub fn hash_to_uuid(hex: &str) -> String {
    debug_assert!(hex.len() >= 32, "digest too short for uuid remap");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Update id for a bundle's `metadata.json` bytes.
pub fn update_id_for_metadata(metadata: &[u8]) -> String {
    hash_to_uuid(&sha256_hex(metadata))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
