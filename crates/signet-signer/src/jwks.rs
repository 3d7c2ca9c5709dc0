// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON Web Key Set publication for Ed25519 verification keys.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::VerifyingKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::SignerError;

/// One published Ed25519 verification key (RFC 8037 OKP form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Jwk {
    /// Key type; always `"OKP"`.
    pub kty: String,
    /// Curve; always `"Ed25519"`.
    pub crv: String,
    /// Public key bytes, base64url without padding.
    pub x: String,
    /// Stable key identifier.
    pub kid: String,
    /// Signature algorithm; always `"EdDSA"`.
    pub alg: String,
    /// Intended use; always `"sig"`.
    #[serde(rename = "use")]
    pub use_: String,
}

impl Jwk {
    /// Publish a verifying key under the given kid.
    pub fn from_verifying_key(kid: &str, key: &VerifyingKey) -> Self {
        Self {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: URL_SAFE_NO_PAD.encode(key.to_bytes()),
            kid: kid.to_string(),
            alg: "EdDSA".to_string(),
            use_: "sig".to_string(),
        }
    }

    /// Decode the published key back into a [`VerifyingKey`].
    ///
    /// # Errors
    ///
    /// [`SignerError::PublicKeyBytes`] when `x` is not a valid encoded key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, SignerError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.x)
            .map_err(|_| SignerError::PublicKeyBytes {
                kid: self.kid.clone(),
            })?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SignerError::PublicKeyBytes {
            kid: self.kid.clone(),
        })?;
        VerifyingKey::from_bytes(&arr).map_err(|_| SignerError::PublicKeyBytes {
            kid: self.kid.clone(),
        })
    }
}

/// The published key set served at `/.well-known/jwks.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JwkSet {
    /// Every key a verifier may encounter: the active key plus prior
    /// rotations.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Build a key set from published keys.
    #[must_use]
    pub fn from_keys(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Resolve a kid to its verifying key.
    ///
    /// # Errors
    ///
    /// [`SignerError::UnknownKid`] when no key carries the kid.
    pub fn resolve(&self, kid: &str) -> Result<VerifyingKey, SignerError> {
        self.keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| SignerError::UnknownKid {
                kid: kid.to_string(),
            })?
            .verifying_key()
    }

    /// Whether the set advertises the given kid.
    #[must_use]
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.iter().any(|k| k.kid == kid)
    }
}
