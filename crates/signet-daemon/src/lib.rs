// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! HTTP surface for the Signet exchange pipeline.
//!
//! Routes, header contracts, and status codes follow the protocol exactly:
//! `X-SIGNET-API-Key` authenticates every `/v1` route,
//! `X-SIGNET-Idempotency-Key` is mandatory on `/v1/exchange`, and export
//! responses carry the bundle CID, signature, and kid in `X-ODIN-*`
//! headers so a verifier can recheck them offline.

pub mod middleware;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path as AxPath, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::HeaderName},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use signet_config::{ReservedConfig, SignetConfig};
use signet_error::{ErrorCode, SignetError};
use signet_fallback::RepairProvider;
use signet_hel::{Allowlist, HelEngine, HostResolver, PinnedForwarder};
use signet_metering::BillingBuffer;
use signet_pipeline::{ExchangePipeline, Exporter, PipelineParts, TenantContext};
use signet_signer::{KeyRing, SignetSigner};
use signet_store::StoragePort;
use signet_telemetry::PipelineMetrics;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Header carrying the tenant API key.
pub const HEADER_API_KEY: &str = "x-signet-api-key";
/// Header carrying the idempotency key on exchange submissions.
pub const HEADER_IDEMPOTENCY_KEY: &str = "x-signet-idempotency-key";
/// Response header echoing the trace id.
pub const HEADER_TRACE: &str = "x-signet-trace";
/// Response header flagging an idempotent replay.
pub const HEADER_IDEMPOTENCY_HIT: &str = "x-signet-idempotency-hit";
/// Export response header carrying the bundle CID.
pub const HEADER_RESPONSE_CID: &str = "x-odin-response-cid";
/// Export response header carrying the detached signature.
pub const HEADER_SIGNATURE: &str = "x-odin-signature";
/// Export response header carrying the signing kid.
pub const HEADER_KID: &str = "x-odin-kid";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared daemon state. Config and reserved capacity are immutable
/// snapshots behind a lock; a reload swaps the `Arc`, and each request
/// pins the snapshot it entered with.
pub struct AppState {
    /// Runtime configuration snapshot.
    pub config: RwLock<Arc<SignetConfig>>,
    /// Reserved-capacity snapshot.
    pub reserved: RwLock<Arc<ReservedConfig>>,
    /// Path the config was loaded from, for reloads.
    pub config_path: Option<PathBuf>,
    /// The exchange pipeline.
    pub pipeline: ExchangePipeline,
    /// Storage, shared with the pipeline.
    pub storage: Arc<dyn StoragePort>,
    /// Active signer and published keys.
    pub keyring: KeyRing,
    /// Export bundle builder.
    pub exporter: Exporter,
}

/// Everything needed to assemble an [`AppState`]; `main` wires production
/// parts, tests wire doubles.
pub struct StateParts {
    /// Validated runtime configuration.
    pub config: SignetConfig,
    /// Reserved-capacity configuration.
    pub reserved: ReservedConfig,
    /// Where the config came from, if reloadable.
    pub config_path: Option<PathBuf>,
    /// Storage engine.
    pub storage: Arc<dyn StoragePort>,
    /// Hostname resolver for policy evaluation.
    pub resolver: Arc<dyn HostResolver>,
    /// Repair provider, if fallback is available.
    pub repair: Option<Arc<dyn RepairProvider>>,
    /// Active signer.
    pub signer: SignetSigner,
    /// Metering buffer (its flusher runs elsewhere).
    pub billing: BillingBuffer,
}

/// Assemble the shared state and pipeline.
pub fn build_state(parts: StateParts) -> Arc<AppState> {
    let signer = Arc::new(parts.signer);
    let keyring = KeyRing::new((*signer).clone());
    let forward = &parts.config.forward;
    let pipeline = ExchangePipeline::new(PipelineParts {
        storage: parts.storage.clone(),
        registry: Arc::new(signet_mapping::builtin_registry()),
        // The global allowlist is unioned into each tenant snapshot at
        // request time so reloads reach it; the engine itself needs none.
        hel: HelEngine::new(Allowlist::new(&[]), parts.resolver),
        forwarder: PinnedForwarder::new(
            std::time::Duration::from_secs(forward.timeout_secs),
            forward.max_response_bytes,
        ),
        signer: signer.clone(),
        repair: parts.repair,
        billing: parts.billing,
        metrics: PipelineMetrics::new(),
    });
    Arc::new(AppState {
        config: RwLock::new(Arc::new(parts.config)),
        reserved: RwLock::new(Arc::new(parts.reserved)),
        config_path: parts.config_path,
        pipeline,
        storage: parts.storage,
        keyring,
        exporter: Exporter::new(signer),
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// API error envelope with a stable code and the HTTP status it maps to.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status for the surface.
    pub status: StatusCode,
    /// Stable error code string.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Structured details (validation errors, violation lists).
    pub details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "AUTH_UNKNOWN_KEY", message)
    }
}

/// Status mapping for the error taxonomy. Policy denials never pass
/// through here: a denied forward is a 200 with a denied receipt.
fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::AuthMissingKey | ErrorCode::AuthUnknownKey => StatusCode::UNAUTHORIZED,
        ErrorCode::RequestMissingIdempotencyKey | ErrorCode::RequestTooLarge => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::RequestMalformed
        | ErrorCode::MappingUnsupported
        | ErrorCode::ValidationArgumentsParse
        | ErrorCode::ValidationRepairNonJson
        | ErrorCode::ValidationSemanticInvariants
        | ErrorCode::ValidationInputSchema
        | ErrorCode::ValidationOutputSchema => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::ChainConflict => StatusCode::CONFLICT,
        ErrorCode::QuotaFuExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::ForwardFailed => StatusCode::BAD_GATEWAY,
        ErrorCode::ExportUnknownTrace => StatusCode::NOT_FOUND,
        ErrorCode::StorageUnavailable | ErrorCode::ConfigInvalid | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<SignetError> for ApiError {
    fn from(err: SignetError) -> Self {
        let details = if err.context.is_empty() {
            None
        } else {
            serde_json::to_value(&err.context).ok()
        };
        Self {
            status: status_for(err.code),
            code: err.code.as_str(),
            message: err.message,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        if let Some(details) = self.details {
            body["error"]["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum router with all daemon routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(cmd_health))
        .route("/.well-known/jwks.json", get(cmd_jwks))
        .route("/v1/exchange", post(cmd_exchange))
        .route("/v1/usage", get(cmd_usage))
        .route("/v1/receipts/chain/{trace_id}", get(cmd_chain))
        .route("/v1/receipts/export/{trace_id}", get(cmd_export_get))
        .route("/v1/export/bundle", post(cmd_export_post))
        .route("/v1/admin/reload-reserved", post(cmd_reload_reserved))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::body_cap_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = match state.storage.health().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };
    Json(json!({
        "ok": storage == "ok",
        "storage": storage,
        "ts": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_jwks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.keyring.jwks())
}

/// Resolve the API key header to a tenant snapshot against the pinned
/// config.
fn authenticate(
    config: &SignetConfig,
    headers: &HeaderMap,
) -> Result<TenantContext, ApiError> {
    let api_key = headers
        .get(HEADER_API_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_KEY",
                "X-SIGNET-API-Key header is required",
            )
        })?;
    let tenant = config
        .tenant_for_key(api_key)
        .ok_or_else(|| ApiError::unauthorized("unknown API key"))?;
    Ok(TenantContext::from_config_with_global(
        api_key,
        tenant,
        &config.global_allowlist,
    ))
}

async fn cmd_exchange(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    // Pin the config snapshot for the whole request.
    let config = state.config.read().await.clone();
    let tenant = authenticate(&config, &headers)?;
    let idempotency_key = headers
        .get(HEADER_IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if idempotency_key.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "REQUEST_MISSING_IDEMPOTENCY_KEY",
            "X-SIGNET-Idempotency-Key header is required",
        ));
    }

    let outcome = state
        .pipeline
        .submit(&tenant, &idempotency_key, &body)
        .await
        .map_err(ApiError::from)?;

    let trace_header = HeaderValue::from_str(&outcome.response.trace_id)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    let replayed = outcome.replayed;
    let mut response = (StatusCode::OK, Json(outcome.response)).into_response();
    response
        .headers_mut()
        .insert(HeaderName::from_static(HEADER_TRACE), trace_header);
    if replayed {
        response.headers_mut().insert(
            HeaderName::from_static(HEADER_IDEMPOTENCY_HIT),
            HeaderValue::from_static("1"),
        );
    }
    Ok(response)
}

/// Month-to-date usage for the calling tenant, priced against its
/// reserved capacity and overage tiers at query time.
async fn cmd_usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let config = state.config.read().await.clone();
    let tenant = authenticate(&config, &headers)?;
    let month = signet_store::month_key(&Utc::now());
    let usage = state
        .storage
        .get_monthly_usage(&tenant.tenant_id, &month)
        .await
        .map_err(|e| ApiError::from(storage_api_err(e)))?;

    let reserved = state.reserved.read().await.clone();
    let capacity = reserved
        .tenants
        .get(&tenant.tenant_id)
        .cloned()
        .unwrap_or_default();
    let report = signet_metering::usage_report(&capacity, usage.vex, usage.fu);
    Ok(Json(json!({
        "tenant": tenant.tenant_id,
        "month": month,
        "usage": report,
    }))
    .into_response())
}

async fn cmd_chain(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxPath(trace_id): AxPath<String>,
) -> Result<Response, ApiError> {
    let config = state.config.read().await.clone();
    let tenant = authenticate(&config, &headers)?;
    let chain = state
        .storage
        .get_chain(&trace_id)
        .await
        .map_err(|e| ApiError::from(storage_api_err(e)))?;
    // Multi-tenant isolation: another tenant's trace looks empty rather
    // than leaking its existence.
    let chain: Vec<_> = chain
        .into_iter()
        .filter(|r| r.tenant == tenant.tenant_id)
        .collect();
    Ok(Json(chain).into_response())
}

async fn cmd_export_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxPath(trace_id): AxPath<String>,
) -> Result<Response, ApiError> {
    export_bundle(&state, &headers, &trace_id).await
}

#[derive(Debug, Deserialize)]
struct ExportBody {
    trace_id: String,
}

async fn cmd_export_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExportBody>,
) -> Result<Response, ApiError> {
    export_bundle(&state, &headers, &body.trace_id).await
}

async fn export_bundle(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    trace_id: &str,
) -> Result<Response, ApiError> {
    let config = state.config.read().await.clone();
    let tenant = authenticate(&config, headers)?;
    let chain = state
        .storage
        .get_chain(trace_id)
        .await
        .map_err(|e| ApiError::from(storage_api_err(e)))?;
    let bundle = state
        .exporter
        .export(trace_id, chain, Some(&tenant.tenant_id))
        .map_err(ApiError::from)?;

    let cid_header = HeaderValue::from_str(&bundle.bundle_cid)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    let sig_header = HeaderValue::from_str(&bundle.signature)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    let kid_header = HeaderValue::from_str(&bundle.kid)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    let mut response = Json(bundle).into_response();
    let headers = response.headers_mut();
    headers.insert(HeaderName::from_static(HEADER_RESPONSE_CID), cid_header);
    headers.insert(HeaderName::from_static(HEADER_SIGNATURE), sig_header);
    headers.insert(HeaderName::from_static(HEADER_KID), kid_header);
    Ok(response)
}

async fn cmd_reload_reserved(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let config = state.config.read().await.clone();
    authenticate(&config, &headers)?;

    let mut reloaded_config = false;
    if let Some(path) = &state.config_path {
        match SignetConfig::load_from_path(path) {
            Ok(fresh) => {
                *state.config.write().await = Arc::new(fresh);
                reloaded_config = true;
            }
            Err(err) => {
                warn!(error = %err, "config reload failed; keeping current snapshot");
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_INVALID",
                    err.to_string(),
                ));
            }
        }
    }

    let reserved_path = {
        let config = state.config.read().await.clone();
        config.reserved_path.clone()
    };
    let mut reloaded_reserved = false;
    if let Some(path) = reserved_path {
        match ReservedConfig::load_from_path(path.as_ref()) {
            Ok(fresh) => {
                *state.reserved.write().await = Arc::new(fresh);
                reloaded_reserved = true;
            }
            Err(err) => {
                warn!(error = %err, "reserved reload failed; keeping current snapshot");
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_INVALID",
                    err.to_string(),
                ));
            }
        }
    }

    info!(reloaded_config, reloaded_reserved, "reload complete");
    Ok(Json(json!({
        "ok": true,
        "reloaded_config": reloaded_config,
        "reloaded_reserved": reloaded_reserved,
    }))
    .into_response())
}

fn storage_api_err(err: signet_store::StorageError) -> SignetError {
    SignetError::new(ErrorCode::StorageUnavailable, "storage read failed").with_source(err)
}
