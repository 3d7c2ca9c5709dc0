// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Fallback repair of malformed tool-call arguments, guarded by semantic invariants."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-fallback
//!
//! When strict JSON parsing of tool-call arguments fails, the pipeline may
//! hand the raw text to an external language model for repair. Everything
//! the model returns is untrusted: the caller re-parses, re-validates, and
//! runs the semantic-invariant check in [`invariants`] before any repaired
//! value reaches a receipt. Token accounting for quota gating lives in
//! [`estimate_fu_tokens`].

mod http;
mod invariants;
mod provider;

pub use http::HttpRepairProvider;
pub use invariants::{RecoveredLiterals, check_invariants, recover_literals};
pub use provider::{CannedRepairProvider, FailingRepairProvider, RepairOutcome, RepairProvider};

/// Errors from the repair provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// The provider could not be reached or timed out.
    #[error("repair provider transport error: {0}")]
    Transport(String),
    /// The provider responded with something other than the expected shape.
    #[error("repair provider returned malformed response: {0}")]
    Protocol(String),
}

/// Estimate the Fallback Unit tokens a repair of `text` will consume,
/// for the pre-call quota gate. Roughly one token per four bytes, rounded
/// up; the provider's actual count replaces this after the call.
pub fn estimate_fu_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_fu_tokens(""), 0);
        assert_eq!(estimate_fu_tokens("a"), 1);
        assert_eq!(estimate_fu_tokens("abcd"), 1);
        assert_eq!(estimate_fu_tokens("abcde"), 2);
        assert_eq!(estimate_fu_tokens(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn estimate_counts_bytes_not_chars() {
        // Four 3-byte characters = 12 bytes = 3 tokens.
        assert_eq!(estimate_fu_tokens("☃☃☃☃"), 3);
    }
}
