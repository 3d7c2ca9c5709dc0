// SPDX-License-Identifier: MIT OR Apache-2.0

//! The signed receipt data model and its fluent builder.
//!
//! A receipt binds the canonical bytes of one normalized payload to a
//! position in a hash chain. Its `receipt_hash` and Ed25519 signature are
//! computed over the canonical form of the receipt *minus* the three
//! self-referential fields (`receipt_hash`, `signature`, `kid`) — a
//! signature cannot cover itself, and the hash is fixed before either is
//! attached.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canon::{CanonError, canonical_bytes};
use crate::cid::cid_from_bytes;

/// Engine tag recorded in every receipt's policy block.
pub const POLICY_ENGINE: &str = "HEL";

/// Errors from receipt hashing and sealing.
#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    /// The receipt could not be converted to a JSON value.
    #[error("receipt serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The receipt's JSON form could not be canonicalized.
    #[error(transparent)]
    Canon(#[from] CanonError),
}

// ---------------------------------------------------------------------------
// Policy / forward blocks
// ---------------------------------------------------------------------------

/// Outcome of Host Egress List evaluation, embedded in the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyResult {
    /// Policy engine tag (`"HEL"`).
    pub engine: String,
    /// Whether egress to the requested host was allowed.
    pub allowed: bool,
    /// Stable reason code (`"ok"`, `"host_not_allowlisted"`, `"private_ip"`, …).
    pub reason: String,
}

impl PolicyResult {
    /// An allow decision with reason `"ok"`.
    pub fn allow() -> Self {
        Self {
            engine: POLICY_ENGINE.to_string(),
            allowed: true,
            reason: "ok".to_string(),
        }
    }

    /// A deny decision with the given reason code.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            engine: POLICY_ENGINE.to_string(),
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Result of the pinned forward attempt, embedded in the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ForwardRecord {
    /// The forward URL as submitted.
    pub url: String,
    /// HTTP status of the upstream response; `0` when the request failed
    /// before a status line was read.
    pub status_code: u16,
    /// Hostname used for TLS SNI and certificate verification.
    pub host: String,
    /// Public address the connection was pinned to.
    pub pinned_ip: String,
    /// Bytes of response body read (bounded by the configured cap).
    pub response_size: u64,
    /// Reason code when the forward failed (`"timeout"`,
    /// `"response_too_large"`, `"connect_error"`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// A hash-chained, signed record of one verified exchange.
///
/// Field names are wire-normative; optional blocks are omitted entirely
/// when absent so that canonical bytes stay minimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Receipt {
    /// Chain identifier shared by every hop of one trace.
    pub trace_id: String,
    /// 1-based position within the chain.
    pub hop: u32,
    /// RFC 3339 UTC timestamp, formatted once at build time.
    pub ts: String,
    /// Owning tenant.
    pub tenant: String,
    /// Content identifier of the normalized payload.
    pub cid: String,
    /// Canonical bytes of the normalized payload, as a UTF-8 string.
    pub canon: String,
    /// Hash algorithm tag (`"sha256"`).
    pub algo: String,
    /// Hash of the previous receipt; `None` iff `hop == 1`.
    pub prev_receipt_hash: Option<String>,
    /// Hash of this receipt's canonical form (minus self-referential fields).
    pub receipt_hash: String,
    /// Egress policy outcome.
    pub policy: PolicyResult,
    /// Forward attempt outcome, present only when a forward was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded: Option<ForwardRecord>,
    /// Whether fallback repair produced the arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,
    /// Fallback Unit tokens consumed by the repair provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fu_tokens: Option<u64>,
    /// Semantic invariant notes, if any were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_violations: Option<Vec<String>>,
    /// Detached Ed25519 signature (standard base64) over the signable form.
    pub signature: String,
    /// Identifier of the signing key within the published key set.
    pub kid: String,
}

impl Receipt {
    /// The canonical bytes that `receipt_hash` and `signature` cover: the
    /// receipt's JSON form with `receipt_hash`, `signature`, and `kid`
    /// removed.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, ReceiptError> {
        let mut v = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut v {
            map.remove("receipt_hash");
            map.remove("signature");
            map.remove("kid");
        }
        Ok(canonical_bytes(&v)?)
    }

    /// Recompute the receipt hash from the signable form.
    pub fn compute_hash(&self) -> Result<String, ReceiptError> {
        Ok(cid_from_bytes(&self.signable_bytes()?))
    }

    /// Verify that the stored `receipt_hash` matches the recomputed hash.
    ///
    /// Returns `false` when the hash differs or the receipt cannot be
    /// serialized.
    pub fn verify_hash(&self) -> bool {
        match self.compute_hash() {
            Ok(recomputed) => recomputed == self.receipt_hash,
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Receipt`]s.
///
/// Produces an unsealed receipt: `receipt_hash`, `signature`, and `kid` are
/// empty until the pipeline computes the hash and signs the canonical form.
///
/// # Examples
///
/// ```
/// use signet_core::{PolicyResult, ReceiptBuilder};
///
/// let r = ReceiptBuilder::new("trace-1", 1, "acme")
///     .ts("2026-08-01T00:00:00.000000Z")
///     .payload("sha256:abc", "{\"x\":1}")
///     .policy(PolicyResult::allow())
///     .build();
/// assert_eq!(r.hop, 1);
/// assert!(r.prev_receipt_hash.is_none());
/// ```
#[derive(Debug)]
pub struct ReceiptBuilder {
    trace_id: String,
    hop: u32,
    tenant: String,
    ts: String,
    cid: String,
    canon: String,
    prev_receipt_hash: Option<String>,
    policy: PolicyResult,
    forwarded: Option<ForwardRecord>,
    fallback_used: Option<bool>,
    fu_tokens: Option<u64>,
    semantic_violations: Option<Vec<String>>,
}

impl ReceiptBuilder {
    /// Start a receipt for the given chain position.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, hop: u32, tenant: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            hop,
            tenant: tenant.into(),
            ts: String::new(),
            cid: String::new(),
            canon: String::new(),
            prev_receipt_hash: None,
            policy: PolicyResult::allow(),
            forwarded: None,
            fallback_used: None,
            fu_tokens: None,
            semantic_violations: None,
        }
    }

    /// Set the RFC 3339 UTC timestamp.
    #[must_use]
    pub fn ts(mut self, ts: impl Into<String>) -> Self {
        self.ts = ts.into();
        self
    }

    /// Set the normalized payload's CID and canonical bytes.
    #[must_use]
    pub fn payload(mut self, cid: impl Into<String>, canon: impl Into<String>) -> Self {
        self.cid = cid.into();
        self.canon = canon.into();
        self
    }

    /// Link to the previous receipt's hash.
    #[must_use]
    pub fn prev_hash(mut self, hash: impl Into<String>) -> Self {
        self.prev_receipt_hash = Some(hash.into());
        self
    }

    /// Set the policy outcome.
    #[must_use]
    pub fn policy(mut self, policy: PolicyResult) -> Self {
        self.policy = policy;
        self
    }

    /// Record a forward attempt.
    #[must_use]
    pub fn forwarded(mut self, record: ForwardRecord) -> Self {
        self.forwarded = Some(record);
        self
    }

    /// Record fallback repair usage.
    #[must_use]
    pub fn fallback(mut self, used: bool, fu_tokens: u64) -> Self {
        self.fallback_used = Some(used);
        if fu_tokens > 0 {
            self.fu_tokens = Some(fu_tokens);
        }
        self
    }

    /// Attach semantic invariant notes.
    #[must_use]
    pub fn semantic_violations(mut self, violations: Vec<String>) -> Self {
        self.semantic_violations = Some(violations);
        self
    }

    /// Build the unsealed receipt.
    #[must_use]
    pub fn build(self) -> Receipt {
        Receipt {
            trace_id: self.trace_id,
            hop: self.hop,
            ts: self.ts,
            tenant: self.tenant,
            cid: self.cid,
            canon: self.canon,
            algo: crate::cid::HASH_ALGO.to_string(),
            prev_receipt_hash: self.prev_receipt_hash,
            receipt_hash: String::new(),
            policy: self.policy,
            forwarded: self.forwarded,
            fallback_used: self.fallback_used,
            fu_tokens: self.fu_tokens,
            semantic_violations: self.semantic_violations,
            signature: String::new(),
            kid: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Export bundle
// ---------------------------------------------------------------------------

/// An exported chain plus its signed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExportBundle {
    /// Chain identifier.
    pub trace_id: String,
    /// Ordered receipts of the chain.
    pub chain: Vec<Receipt>,
    /// RFC 3339 UTC export timestamp.
    pub exported_at: String,
    /// CID of `{trace_id, chain, exported_at}` after canonicalization.
    pub bundle_cid: String,
    /// Detached Ed25519 signature (standard base64) over the bundle CID.
    pub signature: String,
    /// Identifier of the signing key.
    pub kid: String,
}

impl ExportBundle {
    /// The JSON value whose CID is the bundle CID.
    pub fn payload_value(
        trace_id: &str,
        chain: &[Receipt],
        exported_at: &str,
    ) -> Result<Value, serde_json::Error> {
        Ok(serde_json::json!({
            "trace_id": trace_id,
            "chain": serde_json::to_value(chain)?,
            "exported_at": exported_at,
        }))
    }

    /// Verify that `bundle_cid` matches the recomputed CID of the payload.
    pub fn verify_cid(&self) -> bool {
        match Self::payload_value(&self.trace_id, &self.chain, &self.exported_at) {
            Ok(payload) => match crate::cid::cid(&payload) {
                Ok(recomputed) => recomputed == self.bundle_cid,
                Err(_) => false,
            },
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(trace: &str, hop: u32, prev: Option<&str>) -> Receipt {
        let mut b = ReceiptBuilder::new(trace, hop, "acme")
            .ts("2026-08-01T00:00:00.000000Z")
            .payload("sha256:deadbeef", r#"{"x":1}"#)
            .policy(PolicyResult::allow());
        if let Some(p) = prev {
            b = b.prev_hash(p);
        }
        let mut r = b.build();
        r.receipt_hash = r.compute_hash().unwrap();
        r
    }

    #[test]
    fn builder_defaults() {
        let r = ReceiptBuilder::new("t", 1, "acme").build();
        assert_eq!(r.algo, "sha256");
        assert!(r.prev_receipt_hash.is_none());
        assert!(r.forwarded.is_none());
        assert!(r.fallback_used.is_none());
        assert!(r.receipt_hash.is_empty());
    }

    #[test]
    fn hash_is_stable_and_verifies() {
        let r = sealed("t", 1, None);
        assert!(r.verify_hash());
        assert_eq!(r.receipt_hash, r.compute_hash().unwrap());
    }

    #[test]
    fn hash_ignores_self_referential_fields() {
        let mut r = sealed("t", 1, None);
        let before = r.receipt_hash.clone();
        r.signature = "c2lnbmF0dXJl".to_string();
        r.kid = "key-1".to_string();
        assert_eq!(r.compute_hash().unwrap(), before);
        assert!(r.verify_hash());
    }

    #[test]
    fn mutating_payload_breaks_verification() {
        let mut r = sealed("t", 1, None);
        r.canon = r#"{"x":2}"#.to_string();
        assert!(!r.verify_hash());
    }

    #[test]
    fn mutating_prev_hash_breaks_verification() {
        let mut r = sealed("t", 2, Some("sha256:00"));
        r.prev_receipt_hash = Some("sha256:ff".to_string());
        assert!(!r.verify_hash());
    }

    #[test]
    fn optional_blocks_are_omitted_from_wire_form() {
        let r = sealed("t", 1, None);
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("forwarded").is_none());
        assert!(v.get("fallback_used").is_none());
        assert!(v.get("fu_tokens").is_none());
        assert!(v.get("semantic_violations").is_none());
        // prev_receipt_hash is nullable, not omitted.
        assert!(v.get("prev_receipt_hash").is_some());
        assert!(v["prev_receipt_hash"].is_null());
    }

    #[test]
    fn forward_record_error_field_omitted_on_success() {
        let rec = ForwardRecord {
            url: "https://a.partner.com/hook".into(),
            status_code: 200,
            host: "a.partner.com".into(),
            pinned_ip: "203.0.113.9".into(),
            response_size: 12,
            error: None,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert!(v.get("error").is_none());
    }

    #[test]
    fn fallback_zero_tokens_not_recorded() {
        let r = ReceiptBuilder::new("t", 1, "acme").fallback(false, 0).build();
        assert_eq!(r.fallback_used, Some(false));
        assert!(r.fu_tokens.is_none());
    }

    #[test]
    fn policy_constructors() {
        let allow = PolicyResult::allow();
        assert!(allow.allowed);
        assert_eq!(allow.engine, "HEL");
        assert_eq!(allow.reason, "ok");
        let deny = PolicyResult::deny("private_ip");
        assert!(!deny.allowed);
        assert_eq!(deny.reason, "private_ip");
    }

    #[test]
    fn bundle_cid_roundtrip() {
        let chain = vec![sealed("t", 1, None)];
        let payload =
            ExportBundle::payload_value("t", &chain, "2026-08-01T00:00:00.000000Z").unwrap();
        let bundle = ExportBundle {
            trace_id: "t".into(),
            chain,
            exported_at: "2026-08-01T00:00:00.000000Z".into(),
            bundle_cid: crate::cid::cid(&payload).unwrap(),
            signature: String::new(),
            kid: "k".into(),
        };
        assert!(bundle.verify_cid());
    }

    #[test]
    fn bundle_cid_detects_tampering() {
        let chain = vec![sealed("t", 1, None)];
        let payload =
            ExportBundle::payload_value("t", &chain, "2026-08-01T00:00:00.000000Z").unwrap();
        let mut bundle = ExportBundle {
            trace_id: "t".into(),
            chain,
            exported_at: "2026-08-01T00:00:00.000000Z".into(),
            bundle_cid: crate::cid::cid(&payload).unwrap(),
            signature: String::new(),
            kid: "k".into(),
        };
        bundle.exported_at = "2026-08-02T00:00:00.000000Z".into();
        assert!(!bundle.verify_cid());
    }

    #[test]
    fn receipt_serde_roundtrip() {
        let r = sealed("t", 1, None);
        let json = serde_json::to_string(&r).unwrap();
        let back: Receipt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
