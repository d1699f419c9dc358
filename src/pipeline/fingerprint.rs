//! Content fingerprinting: SHA-256 over the raw document bytes.
//!
//! The fingerprint is the cache key. It depends on nothing but the bytes,
//! so renaming or moving a document never invalidates its cache entry, and
//! the same bytes always map to the same key across runs and machines.

use crate::model::ContentFingerprint;
use sha2::{Digest, Sha256};

/// Fingerprint `bytes`. Total: empty input has a fingerprint too.
pub fn fingerprint(bytes: &[u8]) -> ContentFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentFingerprint::from_digest(&hasher.finalize())
}
