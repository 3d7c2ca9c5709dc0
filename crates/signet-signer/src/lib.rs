// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Ed25519 detached signing and JWKS publication."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-signer
//!
//! The active signer holds one Ed25519 private key and publishes a key set
//! advertising every key identifier a verifier may encounter. Receipts and
//! export bundles carry detached signatures (standard base64) plus the
//! signing `kid`; verifiers resolve `kid → public key` through the JWKS and
//! verify offline.

mod jwks;
mod keyring;

pub use jwks::{Jwk, JwkSet};
pub use keyring::KeyRing;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use signet_core::{ExportBundle, Receipt};

/// Errors from signing-key handling and signature verification.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The private-key seed was not 64 hex characters / 32 bytes.
    #[error("invalid Ed25519 seed: {reason}")]
    InvalidSeed {
        /// What was wrong with the seed.
        reason: String,
    },
    /// The requested kid is not present in the key set.
    #[error("unknown kid: {kid}")]
    UnknownKid {
        /// The kid that failed to resolve.
        kid: String,
    },
    /// The signature failed to decode from base64.
    #[error("failed to decode signature: {0}")]
    SignatureDecode(#[from] base64::DecodeError),
    /// The decoded bytes are not a valid Ed25519 signature.
    #[error("invalid Ed25519 signature bytes")]
    SignatureBytes,
    /// The public key bytes in the key set are invalid.
    #[error("invalid Ed25519 public key for kid {kid}")]
    PublicKeyBytes {
        /// The kid whose key failed to decode.
        kid: String,
    },
    /// The signature does not verify over the given bytes.
    #[error("signature verification failed")]
    VerificationFailed,
    /// The receipt could not be serialized into its signable form.
    #[error(transparent)]
    Receipt(#[from] signet_core::ReceiptError),
}

/// The active Ed25519 signer.
#[derive(Clone)]
pub struct SignetSigner {
    signing_key: SigningKey,
    kid: String,
}

impl std::fmt::Debug for SignetSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("SignetSigner").field("kid", &self.kid).finish()
    }
}

impl SignetSigner {
    /// Build a signer from a 32-byte seed given as 64 hex characters.
    ///
    /// # Errors
    ///
    /// [`SignerError::InvalidSeed`] when the hex is malformed or the wrong
    /// length.
    pub fn from_seed_hex(seed_hex: &str, kid: impl Into<String>) -> Result<Self, SignerError> {
        let bytes = hex::decode(seed_hex).map_err(|e| SignerError::InvalidSeed {
            reason: e.to_string(),
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| SignerError::InvalidSeed {
            reason: "seed must be exactly 32 bytes".into(),
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
            kid: kid.into(),
        })
    }

    /// Generate a fresh random signer (development mode).
    pub fn generate(kid: impl Into<String>) -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
            kid: kid.into(),
        }
    }

    /// The key identifier recorded in receipts signed by this signer.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The public half of the signing key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Produce a detached signature over raw bytes, standard base64 encoded.
    pub fn sign(&self, bytes: &[u8]) -> String {
        let signature = self.signing_key.sign(bytes);
        BASE64_STANDARD.encode(signature.to_bytes())
    }

    /// Publish this signer's public key as a JWK.
    pub fn to_jwk(&self) -> Jwk {
        Jwk::from_verifying_key(&self.kid, &self.verifying_key())
    }
}

/// Verify a detached base64 signature over raw bytes with the key `kid`
/// resolves to in the key set.
///
/// # Errors
///
/// [`SignerError::UnknownKid`], decode errors, or
/// [`SignerError::VerificationFailed`].
pub fn verify_detached(
    jwks: &JwkSet,
    kid: &str,
    bytes: &[u8],
    signature_b64: &str,
) -> Result<(), SignerError> {
    let key = jwks.resolve(kid)?;
    let sig_bytes = BASE64_STANDARD.decode(signature_b64)?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| SignerError::SignatureBytes)?;
    key.verify(bytes, &signature)
        .map_err(|_| SignerError::VerificationFailed)
}

/// Verify a receipt's detached signature over its signable form.
///
/// # Errors
///
/// Propagates kid resolution, decoding, serialization, and verification
/// failures.
pub fn verify_receipt_signature(jwks: &JwkSet, receipt: &Receipt) -> Result<(), SignerError> {
    let bytes = receipt.signable_bytes()?;
    verify_detached(jwks, &receipt.kid, &bytes, &receipt.signature)
}

/// Verify an export bundle offline: recompute the bundle CID and check the
/// detached signature over it.
///
/// # Errors
///
/// [`SignerError::VerificationFailed`] when the CID does not match, plus any
/// signature resolution/decoding failure.
pub fn verify_bundle(jwks: &JwkSet, bundle: &ExportBundle) -> Result<(), SignerError> {
    if !bundle.verify_cid() {
        return Err(SignerError::VerificationFailed);
    }
    verify_detached(jwks, &bundle.kid, bundle.bundle_cid.as_bytes(), &bundle.signature)
}
