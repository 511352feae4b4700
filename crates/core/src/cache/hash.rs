//! Entry key generation.

use sha2::{Digest, Sha256};

use crate::model::RequestKey;

/// Compute the storage key of a request identity (method + URL).
pub fn compute_entry_key(key: &RequestKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.method.as_bytes());
    hasher.update(b"\n");
    hasher.update(key.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
