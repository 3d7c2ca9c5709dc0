// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response envelopes and the per-request tenant snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use signet_config::TenantConfig;
use signet_core::{ForwardRecord, Receipt};
use signet_error::{ErrorCode, SignetError};
use signet_hel::Allowlist;
use uuid::Uuid;

/// A validated exchange submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Source payload type tag.
    pub payload_type: String,
    /// Target payload type tag.
    pub target_type: String,
    /// Chain to continue; a fresh trace is minted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// The opaque tool-call payload.
    pub payload: Value,
    /// Destination for the normalized payload, subject to egress policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_url: Option<String>,
}

impl ExchangeRequest {
    /// Validate a raw JSON body into a request.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::RequestMalformed`] when required fields are missing or
    /// have the wrong shape, or a supplied trace id is not UUID-shaped.
    pub fn from_value(body: &Value) -> Result<Self, SignetError> {
        let obj = body
            .as_object()
            .ok_or_else(|| malformed("request body must be a JSON object"))?;
        let payload_type = required_string(obj, "payload_type")?;
        let target_type = required_string(obj, "target_type")?;
        let payload = obj
            .get("payload")
            .ok_or_else(|| malformed("payload is required"))?;
        if !payload.is_object() {
            return Err(malformed("payload must be an object"));
        }
        let trace_id = match obj.get("trace_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                Uuid::parse_str(s)
                    .map_err(|_| malformed("trace_id must be a UUID"))?;
                Some(s.clone())
            }
            Some(_) => return Err(malformed("trace_id must be a string")),
        };
        let forward_url = match obj.get("forward_url") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(malformed("forward_url must be a string")),
        };
        Ok(Self {
            payload_type,
            target_type,
            trace_id,
            payload: payload.clone(),
            forward_url,
        })
    }

    /// Extract `tool_calls[0].function.arguments` from the payload.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::RequestMalformed`] when the field is absent or not a
    /// string.
    pub fn arguments_text(&self) -> Result<&str, SignetError> {
        self.payload
            .get("tool_calls")
            .and_then(|t| t.get(0))
            .and_then(|c| c.get("function"))
            .and_then(|f| f.get("arguments"))
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("payload.tool_calls[0].function.arguments is required"))
    }
}

fn required_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, SignetError> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("{field} is required")))
}

fn malformed(message: impl Into<String>) -> SignetError {
    SignetError::new(ErrorCode::RequestMalformed, message)
}

/// The response body for a successful exchange; also the idempotency
/// snapshot replayed verbatim on retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Chain identifier for this exchange.
    pub trace_id: String,
    /// The normalized payload.
    pub normalized: Value,
    /// The sealed receipt.
    pub receipt: Receipt,
    /// Forward outcome, when a forward was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded: Option<ForwardRecord>,
}

/// Per-request snapshot of one tenant's configuration.
///
/// Compiled at request entry from the config snapshot the request pinned;
/// a concurrent reload never changes it mid-flight.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// API key the request authenticated with.
    pub api_key: String,
    /// Tenant recorded in receipts and usage counters.
    pub tenant_id: String,
    /// Compiled egress allowlist.
    pub allowlist: Allowlist,
    /// Whether fallback repair is available to this tenant.
    pub fallback_enabled: bool,
    /// Monthly FU token budget.
    pub fu_monthly_limit: Option<u64>,
    /// Billing item for VEx units.
    pub vex_billing_item: Option<String>,
    /// Billing item for FU tokens.
    pub fu_billing_item: Option<String>,
}

impl TenantContext {
    /// Build the snapshot for an authenticated key.
    #[must_use]
    pub fn from_config(api_key: impl Into<String>, config: &TenantConfig) -> Self {
        Self::from_config_with_global(api_key, config, &[])
    }

    /// Build the snapshot with the global allowlist unioned in, so a config
    /// reload reaches both lists at once.
    #[must_use]
    pub fn from_config_with_global(
        api_key: impl Into<String>,
        config: &TenantConfig,
        global_allowlist: &[String],
    ) -> Self {
        let mut hosts = config.allowed_hosts.clone();
        hosts.extend(global_allowlist.iter().cloned());
        Self {
            api_key: api_key.into(),
            tenant_id: config.tenant_id.clone(),
            allowlist: Allowlist::new(&hosts),
            fallback_enabled: config.fallback_enabled,
            fu_monthly_limit: config.fu_monthly_limit,
            vex_billing_item: config.vex_billing_item.clone(),
            fu_billing_item: config.fu_billing_item.clone(),
        }
    }
}
