// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key ring: the active signer plus every previously published key.
//!
//! Rotation adds a new key and switches the active kid; prior kids stay in
//! the published set so that receipts signed before the rotation keep
//! verifying.

use crate::jwks::{Jwk, JwkSet};
use crate::{SignetSigner, SignerError};

/// The active signer together with all published verification keys.
#[derive(Debug, Clone)]
pub struct KeyRing {
    active: SignetSigner,
    published: Vec<Jwk>,
}

impl KeyRing {
    /// Create a key ring with a single active signer.
    #[must_use]
    pub fn new(active: SignetSigner) -> Self {
        let published = vec![active.to_jwk()];
        Self { active, published }
    }

    /// The active signer.
    #[must_use]
    pub fn active(&self) -> &SignetSigner {
        &self.active
    }

    /// The active signing kid.
    #[must_use]
    pub fn active_kid(&self) -> &str {
        self.active.kid()
    }

    /// Rotate to a new signer. The previous public key stays published.
    ///
    /// # Errors
    ///
    /// [`SignerError::InvalidSeed`] if the new signer's kid collides with a
    /// published kid (a rotation must mint a fresh identifier).
    pub fn rotate(&mut self, next: SignetSigner) -> Result<(), SignerError> {
        if self.published.iter().any(|k| k.kid == next.kid()) {
            return Err(SignerError::InvalidSeed {
                reason: format!("kid '{}' is already published", next.kid()),
            });
        }
        self.published.push(next.to_jwk());
        self.active = next;
        Ok(())
    }

    /// The published key set, active key included.
    #[must_use]
    pub fn jwks(&self) -> JwkSet {
        JwkSet::from_keys(self.published.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ring_publishes_active_key() {
        let ring = KeyRing::new(SignetSigner::generate("k1"));
        let jwks = ring.jwks();
        assert_eq!(jwks.keys.len(), 1);
        assert!(jwks.contains("k1"));
        assert_eq!(ring.active_kid(), "k1");
    }

    #[test]
    fn rotation_keeps_prior_keys_published() {
        let mut ring = KeyRing::new(SignetSigner::generate("k1"));
        let old_sig = ring.active().sign(b"old receipt");
        ring.rotate(SignetSigner::generate("k2")).unwrap();

        assert_eq!(ring.active_kid(), "k2");
        let jwks = ring.jwks();
        assert!(jwks.contains("k1"));
        assert!(jwks.contains("k2"));
        // A signature minted before the rotation still verifies.
        assert!(crate::verify_detached(&jwks, "k1", b"old receipt", &old_sig).is_ok());
    }

    #[test]
    fn rotation_rejects_duplicate_kid() {
        let mut ring = KeyRing::new(SignetSigner::generate("k1"));
        assert!(ring.rotate(SignetSigner::generate("k1")).is_err());
        assert_eq!(ring.active_kid(), "k1");
    }
}
