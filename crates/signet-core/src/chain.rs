// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hash-chain linkage verification for ordered receipt lists.

use crate::receipt::Receipt;

/// Errors from chain verification, reported at the first broken position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The chain is empty when a non-empty chain was expected.
    #[error("chain is empty")]
    EmptyChain,
    /// A receipt's stored hash does not match the recomputed hash.
    #[error("hash mismatch at hop {hop}")]
    HashMismatch {
        /// Hop of the receipt with the mismatched hash.
        hop: u32,
    },
    /// The genesis receipt must have hop 1 and no previous hash.
    #[error("genesis receipt malformed: hop {hop}, prev hash present: {has_prev}")]
    GenesisMalformed {
        /// Hop found at position 0.
        hop: u32,
        /// Whether a previous hash was present.
        has_prev: bool,
    },
    /// Hop numbering is not monotonic by exactly one.
    #[error("hop sequence broken: expected {expected}, found {found}")]
    HopSequence {
        /// The hop number that was expected.
        expected: u32,
        /// The hop number found.
        found: u32,
    },
    /// A receipt's previous-hash link does not match its predecessor.
    #[error("previous-hash link broken at hop {hop}")]
    BrokenLink {
        /// Hop of the receipt with the broken link.
        hop: u32,
    },
    /// A receipt carries a different trace id than its predecessor.
    #[error("trace id mismatch at hop {hop}")]
    TraceMismatch {
        /// Hop of the offending receipt.
        hop: u32,
    },
}

/// Verify hash integrity and linkage of an ordered receipt chain.
///
/// Checks, in order: non-emptiness, the genesis rule (`hop == 1`,
/// `prev_receipt_hash == None`), per-receipt hash recomputation, hop
/// monotonicity by exactly one, trace-id uniformity, and previous-hash
/// linkage.
///
/// # Errors
///
/// Returns the [`ChainError`] for the first violation found.
pub fn verify_chain(receipts: &[Receipt]) -> Result<(), ChainError> {
    let first = receipts.first().ok_or(ChainError::EmptyChain)?;
    if first.hop != 1 || first.prev_receipt_hash.is_some() {
        return Err(ChainError::GenesisMalformed {
            hop: first.hop,
            has_prev: first.prev_receipt_hash.is_some(),
        });
    }
    for (i, receipt) in receipts.iter().enumerate() {
        if !receipt.verify_hash() {
            return Err(ChainError::HashMismatch { hop: receipt.hop });
        }
        if i == 0 {
            continue;
        }
        let prev = &receipts[i - 1];
        if receipt.hop != prev.hop + 1 {
            return Err(ChainError::HopSequence {
                expected: prev.hop + 1,
                found: receipt.hop,
            });
        }
        if receipt.trace_id != prev.trace_id {
            return Err(ChainError::TraceMismatch { hop: receipt.hop });
        }
        if receipt.prev_receipt_hash.as_deref() != Some(prev.receipt_hash.as_str()) {
            return Err(ChainError::BrokenLink { hop: receipt.hop });
        }
    }
    Ok(())
}
