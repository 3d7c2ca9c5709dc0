// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Canonical serialization, content addressing, receipts, and chain verification."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-core
//!
//! The integrity kernel of Signet: RFC 8785 canonical JSON serialization,
//! SHA-256 content identifiers, the signed receipt data model, and
//! hash-chain verification. Everything here is deterministic and free of
//! I/O; the crates above compose these primitives into the exchange
//! pipeline.

mod canon;
mod chain;
mod cid;
mod receipt;

pub use canon::{CanonError, canonical_bytes, canonical_json};
pub use chain::{ChainError, verify_chain};
pub use cid::{CID_PREFIX, HASH_ALGO, cid, cid_from_bytes, sha256_hex};
pub use receipt::{
    ExportBundle, ForwardRecord, POLICY_ENGINE, PolicyResult, Receipt, ReceiptBuilder,
    ReceiptError,
};
