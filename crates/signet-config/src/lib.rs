// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for Signet.
//!
//! This crate provides [`SignetConfig`] — the daemon's runtime settings —
//! and [`ReservedConfig`] — per-tenant reserved capacity and overage tiers —
//! together with TOML loading, semantic validation, and advisory
//! [`ConfigWarning`]s. Loaded configs are immutable snapshots: a reload
//! constructs a fresh value and the daemon swaps the shared reference.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A tenant has fallback enabled but no repair endpoint is configured.
    FallbackWithoutProvider {
        /// The tenant in question.
        tenant: String,
    },
    /// The forward timeout is unusually large.
    LargeForwardTimeout {
        /// Timeout value in seconds.
        secs: u64,
    },
    /// A tenant has no allowed hosts; every forward will be denied.
    EmptyAllowlist {
        /// The tenant in question.
        tenant: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::FallbackWithoutProvider { tenant } => {
                write!(f, "tenant '{tenant}' enables fallback but no repair endpoint is set")
            }
            ConfigWarning::LargeForwardTimeout { secs } => {
                write!(f, "forward timeout is large ({secs}s)")
            }
            ConfigWarning::EmptyAllowlist { tenant } => {
                write!(f, "tenant '{tenant}' has an empty allowlist")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the Signet daemon.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SignetConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Storage DSN: `memory:` or `file:<path>`.
    #[serde(default = "default_storage_dsn")]
    pub storage_dsn: String,

    /// Hard cap on request body size in bytes; larger requests are rejected.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Outbound forwarding limits.
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Hosts allowed for every tenant, unioned with tenant allowlists.
    #[serde(default)]
    pub global_allowlist: Vec<String>,

    /// Active signing key settings.
    #[serde(default)]
    pub signing: SigningConfig,

    /// Fallback repair provider settings.
    #[serde(default)]
    pub fallback: FallbackProviderConfig,

    /// Path to the reserved-capacity TOML file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_path: Option<String>,

    /// Tenant table keyed by API key.
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantConfig>,
}

impl Default for SignetConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage_dsn: default_storage_dsn(),
            max_body_bytes: default_max_body_bytes(),
            log_level: Some("info".into()),
            forward: ForwardConfig::default(),
            global_allowlist: Vec::new(),
            signing: SigningConfig::default(),
            fallback: FallbackProviderConfig::default(),
            reserved_path: None,
            tenants: BTreeMap::new(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8088".into()
}

fn default_storage_dsn() -> String {
    "memory:".into()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Limits applied to pinned outbound forwards.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ForwardConfig {
    /// Total elapsed-time cap in seconds for one forward.
    #[serde(default = "default_forward_timeout")]
    pub timeout_secs: u64,
    /// Streamed response-body cap in bytes.
    #[serde(default = "default_forward_response_cap")]
    pub max_response_bytes: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_forward_timeout(),
            max_response_bytes: default_forward_response_cap(),
        }
    }
}

fn default_forward_timeout() -> u64 {
    30
}

fn default_forward_response_cap() -> u64 {
    1024 * 1024
}

/// Active signing key settings.
///
/// When `private_key_hex` is absent the daemon generates an ephemeral key at
/// startup (development mode); receipts from previous runs will no longer
/// verify against the fresh key set.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SigningConfig {
    /// Stable key identifier advertised in the JWKS.
    #[serde(default = "default_kid")]
    pub kid: String,
    /// 32-byte Ed25519 seed as 64 hex characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_hex: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            kid: default_kid(),
            private_key_hex: None,
        }
    }
}

fn default_kid() -> String {
    "signet-key-1".into()
}

/// Fallback repair provider settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct FallbackProviderConfig {
    /// Chat-completions endpoint of the repair model; `None` disables the
    /// HTTP provider entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Model name sent with each repair request.
    #[serde(default = "default_fallback_model")]
    pub model: String,
    /// Environment variable holding the provider API key.
    #[serde(default = "default_fallback_key_env")]
    pub api_key_env: String,
}

impl Default for FallbackProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_fallback_model(),
            api_key_env: default_fallback_key_env(),
        }
    }
}

fn default_fallback_model() -> String {
    "gpt-4o-mini".into()
}

fn default_fallback_key_env() -> String {
    "SIGNET_FALLBACK_API_KEY".into()
}

/// Per-tenant configuration, keyed by API key in [`SignetConfig::tenants`].
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TenantConfig {
    /// Stable tenant identifier recorded in receipts.
    pub tenant_id: String,
    /// DNS names this tenant may forward to. A leading `*.` label matches
    /// exactly one subdomain label.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Whether malformed tool-call arguments may be repaired.
    #[serde(default)]
    pub fallback_enabled: bool,
    /// Monthly Fallback Unit token budget; `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fu_monthly_limit: Option<u64>,
    /// Billing item for Verified Exchange units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vex_billing_item: Option<String>,
    /// Billing item for Fallback Unit tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fu_billing_item: Option<String>,
}

// ---------------------------------------------------------------------------
// Reserved capacity
// ---------------------------------------------------------------------------

/// Reserved capacity and tiered overage pricing, loaded from its own file so
/// it can be reloaded independently of the main config.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ReservedConfig {
    /// Per-tenant reserved capacity, keyed by tenant id.
    #[serde(default)]
    pub tenants: BTreeMap<String, ReservedCapacity>,
}

/// One tenant's reserved units and overage tiers.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ReservedCapacity {
    /// Verified Exchange units included before overage applies.
    #[serde(default)]
    pub reserved_vex: u64,
    /// Fallback Unit tokens included before overage applies.
    #[serde(default)]
    pub reserved_fu: u64,
    /// Overage tiers for VEx, ordered by strictly increasing threshold.
    #[serde(default)]
    pub vex_tiers: Vec<OverageTier>,
    /// Overage tiers for FU, ordered by strictly increasing threshold.
    #[serde(default)]
    pub fu_tiers: Vec<OverageTier>,
}

/// One overage tier: units past `threshold` (and up to the next tier's
/// threshold) are charged at `price` per unit.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct OverageTier {
    /// Overage units at which this tier begins (0 = first overage unit).
    pub threshold: u64,
    /// Price per unit within this tier.
    pub price: f64,
    /// Billing item the tier's charge is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_item: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl SignetConfig {
    /// Load and validate a config from a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileNotFound`], [`ConfigError::ParseError`], or
    /// [`ConfigError::ValidationError`].
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();

        if !(self.storage_dsn.starts_with("memory:") || self.storage_dsn.starts_with("file:")) {
            reasons.push(format!("unrecognized storage DSN '{}'", self.storage_dsn));
        }
        if self.max_body_bytes == 0 {
            reasons.push("max_body_bytes must be positive".into());
        }
        if self.forward.timeout_secs == 0 {
            reasons.push("forward.timeout_secs must be positive".into());
        }
        if self.forward.max_response_bytes == 0 {
            reasons.push("forward.max_response_bytes must be positive".into());
        }
        if let Some(hex) = &self.signing.private_key_hex {
            if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                reasons.push("signing.private_key_hex must be 64 hex characters".into());
            }
        }
        if self.signing.kid.is_empty() {
            reasons.push("signing.kid must not be empty".into());
        }

        for entry in &self.global_allowlist {
            if let Err(reason) = validate_host_entry(entry) {
                reasons.push(format!("global allowlist entry '{entry}': {reason}"));
            }
        }
        for (api_key, tenant) in &self.tenants {
            if api_key.is_empty() {
                reasons.push("empty API key in tenant table".into());
            }
            if tenant.tenant_id.is_empty() {
                reasons.push(format!("tenant for key '{api_key}' has empty tenant_id"));
            }
            for entry in &tenant.allowed_hosts {
                if let Err(reason) = validate_host_entry(entry) {
                    reasons.push(format!(
                        "tenant '{}' allowlist entry '{entry}': {reason}",
                        tenant.tenant_id
                    ));
                }
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError { reasons })
        }
    }

    /// Advisory warnings for configurations that validate but look off.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut out = Vec::new();
        if self.forward.timeout_secs > 120 {
            out.push(ConfigWarning::LargeForwardTimeout {
                secs: self.forward.timeout_secs,
            });
        }
        for tenant in self.tenants.values() {
            if tenant.fallback_enabled && self.fallback.endpoint.is_none() {
                out.push(ConfigWarning::FallbackWithoutProvider {
                    tenant: tenant.tenant_id.clone(),
                });
            }
            if tenant.allowed_hosts.is_empty() && self.global_allowlist.is_empty() {
                out.push(ConfigWarning::EmptyAllowlist {
                    tenant: tenant.tenant_id.clone(),
                });
            }
        }
        out
    }

    /// Look up the tenant for an API key.
    pub fn tenant_for_key(&self, api_key: &str) -> Option<&TenantConfig> {
        self.tenants.get(api_key)
    }
}

impl ReservedConfig {
    /// Load and validate a reserved-capacity file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileNotFound`], [`ConfigError::ParseError`], or
    /// [`ConfigError::ValidationError`].
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation: tiers must be strictly increasing by threshold
    /// and carry non-negative prices.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();
        for (tenant, capacity) in &self.tenants {
            for (label, tiers) in [("vex", &capacity.vex_tiers), ("fu", &capacity.fu_tiers)] {
                for pair in tiers.windows(2) {
                    if pair[1].threshold <= pair[0].threshold {
                        reasons.push(format!(
                            "tenant '{tenant}' {label} tiers not strictly increasing at threshold {}",
                            pair[1].threshold
                        ));
                    }
                }
                for tier in tiers.iter() {
                    if tier.price < 0.0 {
                        reasons.push(format!(
                            "tenant '{tenant}' {label} tier at {} has negative price",
                            tier.threshold
                        ));
                    }
                }
            }
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError { reasons })
        }
    }
}

/// Validate one allowlist entry: a DNS name, optionally with a single
/// leading `*.` wildcard label.
pub fn validate_host_entry(entry: &str) -> Result<(), String> {
    if entry.is_empty() {
        return Err("empty entry".into());
    }
    let host = entry.strip_prefix("*.").unwrap_or(entry);
    if host.is_empty() {
        return Err("wildcard without a base domain".into());
    }
    if host.contains('*') {
        return Err("wildcard is only allowed as a single leading label".into());
    }
    if host.starts_with('.') || host.ends_with('.') || host.contains("..") {
        return Err("malformed DNS name".into());
    }
    for label in host.split('.') {
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("malformed DNS label '{label}'"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
