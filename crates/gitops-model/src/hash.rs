//! Canonical content hashing
//!
//! Provides a single canonical checksum format (`sha256:<hex>`) used
//! throughout the workspace to compare manifest content. serde_json maps are
//! key-sorted, so serializing a value and hashing the bytes is stable across
//! runs and across processes.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix for all checksums produced by this module
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// Compute the canonical SHA-256 checksum of a JSON value.
///
/// Returns a string in the canonical format `"sha256:<hex>"`. Two values that
/// are structurally equal always produce the same checksum regardless of the
/// order their keys were inserted in.
pub fn canonical_hash(value: &Value) -> String {
    let serialized = value.to_string();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{}{:x}", CHECKSUM_PREFIX, hasher.finalize())
}
