// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! # signet
//!
//! Umbrella crate for the Signet verifiable exchange middleware. Re-exports
//! the member crates so integrators can depend on one name; the binary
//! lives in `signet-daemon`.
//!
//! Signet converts opaque AI tool-call outputs into verifiable, normalized
//! exchanges: canonical JSON (RFC 8785) and SHA-256 content addressing,
//! hash-chained Ed25519-signed receipts with JWKS publication, SSRF-safe
//! pinned forwarding under a Host Egress List, guarded fallback repair of
//! malformed arguments, atomic chain-append storage with idempotency, and
//! signed export bundles for offline verification.

pub use signet_config as config;
pub use signet_core as core;
pub use signet_daemon as daemon;
pub use signet_error as error;
pub use signet_fallback as fallback;
pub use signet_hel as hel;
pub use signet_mapping as mapping;
pub use signet_metering as metering;
pub use signet_pipeline as pipeline;
pub use signet_signer as signer;
pub use signet_store as store;
pub use signet_telemetry as telemetry;
