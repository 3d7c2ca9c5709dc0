// SPDX-License-Identifier: MIT OR Apache-2.0

//! The exchange pipeline orchestrator.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use signet_core::{PolicyResult, ReceiptBuilder, cid_from_bytes, canonical_json};
use signet_error::{ErrorCode, SignetError};
use signet_fallback::{RepairProvider, check_invariants, estimate_fu_tokens, recover_literals};
use signet_hel::{HelDecision, HelEngine, PinnedForwarder};
use signet_mapping::{MappingEntry, MappingRegistry};
use signet_metering::{BillingBuffer, MeterEvent, MeterUnit};
use signet_signer::SignetSigner;
use signet_store::{AppendOutcome, ExchangeCommit, StoragePort, month_key};
use signet_telemetry::PipelineMetrics;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::request::{ExchangeRequest, ExchangeResponse, TenantContext};

/// Everything the pipeline composes, supplied by the daemon at startup.
pub struct PipelineParts {
    /// Receipt, idempotency, and usage storage.
    pub storage: Arc<dyn StoragePort>,
    /// Registered payload mappings.
    pub registry: Arc<MappingRegistry>,
    /// Egress policy engine.
    pub hel: HelEngine,
    /// Pinned outbound forwarder.
    pub forwarder: PinnedForwarder,
    /// Active receipt signer.
    pub signer: Arc<SignetSigner>,
    /// Repair provider; `None` behaves like fallback disabled everywhere.
    pub repair: Option<Arc<dyn RepairProvider>>,
    /// Usage metering buffer.
    pub billing: BillingBuffer,
    /// Outcome counters.
    pub metrics: PipelineMetrics,
}

/// A successful submission: the response plus whether it was replayed from
/// the idempotency cache.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The response body (or cached snapshot on replay).
    pub response: ExchangeResponse,
    /// `true` when served from the idempotency cache with no side effects.
    pub replayed: bool,
}

/// The exchange pipeline. Cheap to clone; all parts are shared.
#[derive(Clone)]
pub struct ExchangePipeline {
    parts: Arc<PipelineParts>,
}

impl ExchangePipeline {
    /// Assemble a pipeline from its parts.
    #[must_use]
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            parts: Arc::new(parts),
        }
    }

    /// Outcome counters, for health/diagnostics surfaces.
    #[must_use]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.parts.metrics
    }

    /// Submit one exchange for an authenticated tenant.
    ///
    /// # Errors
    ///
    /// A typed [`SignetError`]; no receipt exists and no usage was counted
    /// unless the error is a forward failure embedded in a success.
    pub async fn submit(
        &self,
        tenant: &TenantContext,
        idempotency_key: &str,
        body: &Value,
    ) -> Result<SubmitOutcome, SignetError> {
        let result = self.submit_inner(tenant, idempotency_key, body).await;
        if result.is_err() {
            self.parts.metrics.record_rejection();
        }
        result
    }

    async fn submit_inner(
        &self,
        tenant: &TenantContext,
        idempotency_key: &str,
        body: &Value,
    ) -> Result<SubmitOutcome, SignetError> {
        let parts = &self.parts;
        if idempotency_key.is_empty() {
            return Err(SignetError::new(
                ErrorCode::RequestMissingIdempotencyKey,
                "idempotency key is required",
            ));
        }

        // Replays return the cached snapshot with no side effects.
        if let Some(snapshot) = parts
            .storage
            .get_idempotent(&tenant.api_key, idempotency_key)
            .await
            .map_err(storage_err)?
        {
            let response: ExchangeResponse =
                serde_json::from_value(snapshot).map_err(|e| internal("cached response decode", e))?;
            parts.metrics.record_replay();
            return Ok(SubmitOutcome {
                response,
                replayed: true,
            });
        }

        let request = ExchangeRequest::from_value(body)?;
        let mapping = parts
            .registry
            .lookup(&request.payload_type, &request.target_type)
            .ok_or_else(|| {
                SignetError::new(
                    ErrorCode::MappingUnsupported,
                    format!(
                        "no mapping for {} -> {}",
                        request.payload_type, request.target_type
                    ),
                )
            })?;

        let raw_args = request.arguments_text()?;
        let (parsed, fallback_used, fu_tokens) = match serde_json::from_str::<Value>(raw_args) {
            Ok(value) => (value, false, 0),
            Err(_) => self.repair_arguments(tenant, raw_args, &mapping).await?,
        };

        let sanitized = mapping.sanitize(&parsed);
        mapping.validate_input(&sanitized).map_err(|errors| {
            SignetError::new(ErrorCode::ValidationInputSchema, "input schema validation failed")
                .with_context("errors", errors)
        })?;
        let normalized = mapping
            .transform(&sanitized)
            .map_err(|e| internal("transform failed on schema-valid input", e))?;
        mapping.validate_output(&normalized).map_err(|errors| {
            SignetError::new(
                ErrorCode::ValidationOutputSchema,
                "normalized schema validation failed",
            )
            .with_context("errors", errors)
        })?;

        // Policy evaluation. A denial is a normal outcome: it is recorded in
        // the receipt and the exchange still counts.
        let (policy, forward_target) = match &request.forward_url {
            Some(raw_url) => {
                let decision = parts.hel.evaluate(raw_url, &tenant.allowlist).await;
                let policy = decision.policy_result();
                let target = match decision {
                    HelDecision::Allow { ip, .. } => {
                        let url = Url::parse(raw_url)
                            .map_err(|e| internal("forward url re-parse", e))?;
                        Some((url, ip))
                    }
                    HelDecision::Deny { .. } => None,
                };
                (policy, target)
            }
            None => (PolicyResult::allow(), None),
        };

        let canon = canonical_json(&normalized)
            .map_err(|e| internal("normalized payload canonicalization", e))?;
        let payload_cid = cid_from_bytes(canon.as_bytes());

        let trace_id = request
            .trace_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let last = parts
            .storage
            .get_last(&trace_id)
            .await
            .map_err(storage_err)?;
        let (expected_prev_hop, hop, prev_hash) = match last {
            Some(prev) => (prev.hop, prev.hop + 1, Some(prev.receipt_hash)),
            None => (0, 1, None),
        };

        let now = Utc::now();
        let ts = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let month = month_key(&now);

        // The tail — forward, seal, persist, meter — runs on its own task
        // so dropping the request future cannot abort a commit in progress.
        let parts = Arc::clone(&self.parts);
        let tenant = tenant.clone();
        let idempotency_key = idempotency_key.to_string();
        let normalized_for_tail = normalized.clone();
        let handle = tokio::spawn(async move {
            commit_tail(
                parts,
                tenant,
                idempotency_key,
                TailInput {
                    trace_id,
                    hop,
                    prev_hash,
                    expected_prev_hop,
                    ts,
                    month,
                    policy,
                    forward_target,
                    canon,
                    payload_cid,
                    normalized: normalized_for_tail,
                    fallback_used,
                    fu_tokens,
                },
            )
            .await
        });
        handle
            .await
            .map_err(|e| internal("pipeline tail task failed", e))?
    }

    async fn repair_arguments(
        &self,
        tenant: &TenantContext,
        raw: &str,
        mapping: &Arc<MappingEntry>,
    ) -> Result<(Value, bool, u64), SignetError> {
        if !tenant.fallback_enabled {
            return Err(SignetError::new(
                ErrorCode::ValidationArgumentsParse,
                "arguments parse failed",
            ));
        }
        let Some(provider) = &self.parts.repair else {
            return Err(SignetError::new(
                ErrorCode::ValidationArgumentsParse,
                "arguments parse failed",
            )
            .with_context("fallback", "no repair provider configured"));
        };

        // Quota gate runs on the estimate; the model is never called when
        // the budget would be exceeded.
        let estimate = estimate_fu_tokens(raw);
        if let Some(limit) = tenant.fu_monthly_limit {
            let month = month_key(&Utc::now());
            let usage = self
                .parts
                .storage
                .get_monthly_usage(&tenant.tenant_id, &month)
                .await
                .map_err(storage_err)?;
            if usage.fu + estimate > limit {
                return Err(SignetError::new(
                    ErrorCode::QuotaFuExceeded,
                    "monthly fallback token budget would be exceeded",
                )
                .with_context("limit", limit)
                .with_context("used", usage.fu)
                .with_context("estimate", estimate));
            }
        }

        let outcome = provider
            .repair(raw, mapping.input_schema())
            .await
            .map_err(|e| {
                SignetError::new(ErrorCode::ValidationArgumentsParse, "fallback repair unavailable")
                    .with_source(e)
            })?;
        let repaired: Value = serde_json::from_str(&outcome.text).map_err(|_| {
            SignetError::new(ErrorCode::ValidationRepairNonJson, "repair produced non-JSON")
        })?;

        let recovered = recover_literals(raw);
        let violations =
            check_invariants(&recovered, &repaired, mapping.required_input_fields());
        if !violations.is_empty() {
            warn!(violations = ?violations, "fallback repair rejected");
            return Err(SignetError::new(
                ErrorCode::ValidationSemanticInvariants,
                "semantic invariants violated",
            )
            .with_context("violations", violations));
        }
        Ok((repaired, true, outcome.tokens))
    }
}

struct TailInput {
    trace_id: String,
    hop: u32,
    prev_hash: Option<String>,
    expected_prev_hop: u32,
    ts: String,
    month: String,
    policy: PolicyResult,
    forward_target: Option<(Url, std::net::IpAddr)>,
    canon: String,
    payload_cid: String,
    normalized: Value,
    fallback_used: bool,
    fu_tokens: u64,
}

async fn commit_tail(
    parts: Arc<PipelineParts>,
    tenant: TenantContext,
    idempotency_key: String,
    input: TailInput,
) -> Result<SubmitOutcome, SignetError> {
    let mut builder = ReceiptBuilder::new(
        input.trace_id.as_str(),
        input.hop,
        tenant.tenant_id.as_str(),
    )
    .ts(input.ts.as_str())
    .payload(input.payload_cid.as_str(), input.canon.as_str())
    .policy(input.policy.clone())
    .fallback(input.fallback_used, input.fu_tokens);
    if let Some(prev) = &input.prev_hash {
        builder = builder.prev_hash(prev.clone());
    }

    // Best-effort forward: failures land in the receipt, never in the
    // response status.
    let mut forwarded = None;
    if input.policy.allowed {
        if let Some((url, ip)) = &input.forward_target {
            let record = parts
                .forwarder
                .forward(url, *ip, input.canon.clone().into_bytes())
                .await;
            builder = builder.forwarded(record.clone());
            forwarded = Some(record);
        }
    }

    let mut receipt = builder.build();
    let signable = receipt
        .signable_bytes()
        .map_err(|e| internal("receipt canonicalization", e))?;
    receipt.receipt_hash = cid_from_bytes(&signable);
    receipt.signature = parts.signer.sign(&signable);
    receipt.kid = parts.signer.kid().to_string();

    let response = ExchangeResponse {
        trace_id: input.trace_id.clone(),
        normalized: input.normalized,
        receipt: receipt.clone(),
        forwarded: forwarded.clone(),
    };
    let snapshot =
        serde_json::to_value(&response).map_err(|e| internal("response snapshot", e))?;

    let outcome = parts
        .storage
        .append_exchange(ExchangeCommit {
            expected_prev_hop: input.expected_prev_hop,
            receipt: &receipt,
            api_key: &tenant.api_key,
            idempotency_key: &idempotency_key,
            response_snapshot: &snapshot,
            month: &input.month,
            vex_delta: 1,
            fu_delta: input.fu_tokens,
        })
        .await
        .map_err(storage_err)?;
    if let AppendOutcome::ChainConflict { current_hop } = outcome {
        return Err(SignetError::new(
            ErrorCode::ChainConflict,
            "a concurrent exchange advanced this trace first",
        )
        .with_context("trace_id", &input.trace_id)
        .with_context("current_hop", current_hop));
    }

    parts
        .billing
        .enqueue(MeterEvent {
            tenant: tenant.tenant_id.clone(),
            unit: MeterUnit::Vex,
            billing_item: tenant.vex_billing_item.clone(),
            quantity: 1,
        })
        .await;
    if input.fu_tokens > 0 {
        parts
            .billing
            .enqueue(MeterEvent {
                tenant: tenant.tenant_id.clone(),
                unit: MeterUnit::Fu,
                billing_item: tenant.fu_billing_item.clone(),
                quantity: input.fu_tokens,
            })
            .await;
    }

    let forward_error = forwarded
        .as_ref()
        .is_some_and(|record| record.error.is_some());
    parts
        .metrics
        .record_exchange(input.fallback_used, !input.policy.allowed, forward_error);
    info!(
        trace_id = %input.trace_id,
        hop = input.hop,
        tenant = %tenant.tenant_id,
        allowed = input.policy.allowed,
        fallback = input.fallback_used,
        "exchange committed"
    );

    Ok(SubmitOutcome {
        response,
        replayed: false,
    })
}

fn storage_err(err: signet_store::StorageError) -> SignetError {
    SignetError::new(ErrorCode::StorageUnavailable, "storage transaction failed").with_source(err)
}

fn internal(
    what: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> SignetError {
    SignetError::new(ErrorCode::Internal, what.to_string()).with_source(err)
}
