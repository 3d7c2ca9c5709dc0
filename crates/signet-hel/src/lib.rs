// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Host Egress List policy evaluation and pinned outbound forwarding."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-hel
//!
//! The Host Egress List subsystem decides whether a forward URL may be
//! contacted at all, resolves its hostname, and selects a publicly
//! routable address. The pinned forwarder then connects to exactly that
//! address while TLS SNI and certificate verification keep the original
//! hostname, so a DNS rebind between evaluation and connection cannot
//! redirect the request.

mod forward;
mod policy;
mod resolve;
mod routable;

pub use forward::PinnedForwarder;
pub use policy::{Allowlist, HelDecision, HelEngine, HostPattern, reason};
pub use resolve::{HostResolver, StaticResolver, SystemResolver};
pub use routable::is_publicly_routable;
