//! Shared SHA-256 hex digest utilities.
//!
//! Used by `fingerprint` for cache keys and by `cache` for artifact content
//! hashes, so both sides of an idempotency comparison use the same digest.

use sha2::{Digest, Sha256};

/// Field separator for multi-part digests. Unit Separator never appears in
/// normalized text, so joined fields cannot collide by concatenation.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute a SHA-256 hex digest over an ordered list of string fields.
///
/// Fields are fed through a single hasher separated by [`FIELD_SEPARATOR`],
/// so `["ab", "c"]` and `["a", "bc"]` produce different digests.
pub fn sha256_hex_fields(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }
    let hash = hasher.finalize();
    format!("{hash:x}")
}
