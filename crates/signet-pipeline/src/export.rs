// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed export bundles for offline chain verification.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use signet_core::{ExportBundle, Receipt, cid};
use signet_error::{ErrorCode, SignetError};
use signet_signer::SignetSigner;

/// Builds signed export bundles from stored chains.
#[derive(Clone)]
pub struct Exporter {
    signer: Arc<SignetSigner>,
}

impl Exporter {
    /// Build an exporter over the active signer.
    #[must_use]
    pub fn new(signer: Arc<SignetSigner>) -> Self {
        Self { signer }
    }

    /// Assemble and sign a bundle for a chain.
    ///
    /// When `tenant` is given, every receipt must belong to it — a foreign
    /// trace is indistinguishable from an unknown one.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::ExportUnknownTrace`] for empty or foreign chains;
    /// internal errors when canonicalization fails.
    pub fn export(
        &self,
        trace_id: &str,
        chain: Vec<Receipt>,
        tenant: Option<&str>,
    ) -> Result<ExportBundle, SignetError> {
        if chain.is_empty() {
            return Err(unknown_trace(trace_id));
        }
        if let Some(tenant) = tenant {
            if chain.iter().any(|r| r.tenant != tenant) {
                return Err(unknown_trace(trace_id));
            }
        }

        let exported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let payload = ExportBundle::payload_value(trace_id, &chain, &exported_at)
            .map_err(|e| SignetError::new(ErrorCode::Internal, "bundle payload").with_source(e))?;
        let bundle_cid = cid(&payload).map_err(|e| {
            SignetError::new(ErrorCode::Internal, "bundle canonicalization").with_source(e)
        })?;
        let signature = self.signer.sign(bundle_cid.as_bytes());

        Ok(ExportBundle {
            trace_id: trace_id.to_string(),
            chain,
            exported_at,
            bundle_cid,
            signature,
            kid: self.signer.kid().to_string(),
        })
    }
}

fn unknown_trace(trace_id: &str) -> SignetError {
    SignetError::new(ErrorCode::ExportUnknownTrace, "no chain for trace")
        .with_context("trace_id", trace_id)
}
