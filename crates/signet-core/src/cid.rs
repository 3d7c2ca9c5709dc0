// SPDX-License-Identifier: MIT OR Apache-2.0

//! SHA-256 content identifiers over canonical bytes.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canon::{CanonError, canonical_bytes};

/// Hash algorithm tag recorded in every receipt.
pub const HASH_ALGO: &str = "sha256";

/// Prefix of every content identifier and receipt hash.
pub const CID_PREFIX: &str = "sha256:";

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content identifier of raw bytes: `"sha256:" + lower_hex(sha256(bytes))`.
pub fn cid_from_bytes(bytes: &[u8]) -> String {
    format!("{CID_PREFIX}{}", sha256_hex(bytes))
}

/// Content identifier of a JSON value over its canonical serialization.
///
/// # Errors
///
/// Returns [`CanonError`] if the value cannot be canonicalized.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use signet_core::cid;
///
/// let id = cid(&json!({"a": 1})).unwrap();
/// assert!(id.starts_with("sha256:"));
/// assert_eq!(id.len(), "sha256:".len() + 64);
/// ```
pub fn cid(value: &Value) -> Result<String, CanonError> {
    Ok(cid_from_bytes(&canonical_bytes(value)?))
}
