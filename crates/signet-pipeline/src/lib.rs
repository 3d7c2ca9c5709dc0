// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "The exchange pipeline orchestrator and the export bundle builder."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-pipeline
//!
//! Orchestrates one exchange end to end: idempotency check, request
//! validation, argument extraction, optional fallback repair under quota
//! and semantic-invariant guardrails, transform, schema validation, egress
//! policy, canonicalization, receipt sealing, the atomic storage commit,
//! best-effort forwarding, and metering. Every step is a total function
//! returning success or a typed [`signet_error::SignetError`].

mod export;
mod pipeline;
mod request;

pub use export::Exporter;
pub use pipeline::{ExchangePipeline, PipelineParts, SubmitOutcome};
pub use request::{ExchangeRequest, ExchangeResponse, TenantContext};
