// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unified error taxonomy with stable error codes for Signet.
//!
//! Every Signet error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by
//! [`SignetError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// API-key authentication errors.
    Auth,
    /// Malformed or oversized requests.
    Request,
    /// Mapping registry errors.
    Mapping,
    /// Payload, schema, or invariant validation errors.
    Validation,
    /// Chain-append concurrency errors.
    Chain,
    /// Metering quota errors.
    Quota,
    /// Egress policy and forwarding errors.
    Forward,
    /// Export bundle errors.
    Export,
    /// Storage-layer errors.
    Storage,
    /// Configuration errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::Request => "request",
            Self::Mapping => "mapping",
            Self::Validation => "validation",
            Self::Chain => "chain",
            Self::Quota => "quota",
            Self::Forward => "forward",
            Self::Export => "export",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Auth --
    /// No `X-SIGNET-API-Key` header was supplied.
    AuthMissingKey,
    /// The supplied API key maps to no tenant.
    AuthUnknownKey,

    // -- Request --
    /// The idempotency header is missing or empty.
    RequestMissingIdempotencyKey,
    /// Required request fields are missing or have the wrong shape.
    RequestMalformed,
    /// The request body exceeds the configured hard cap.
    RequestTooLarge,

    // -- Mapping --
    /// The (source, target) pair is not registered.
    MappingUnsupported,

    // -- Validation --
    /// Tool-call arguments failed strict JSON parsing and repair was
    /// unavailable or failed.
    ValidationArgumentsParse,
    /// The repair provider returned text that is not JSON.
    ValidationRepairNonJson,
    /// The repaired object mutated a protected value.
    ValidationSemanticInvariants,
    /// The parsed arguments failed the mapping's input schema.
    ValidationInputSchema,
    /// The normalized payload failed the mapping's output schema.
    ValidationOutputSchema,

    // -- Chain --
    /// A concurrent appender won the race for this hop.
    ChainConflict,

    // -- Quota --
    /// The tenant's monthly fallback-token budget would be exceeded.
    QuotaFuExceeded,

    // -- Forward --
    /// The pinned forward request failed (network, TLS, timeout, overflow).
    ForwardFailed,

    // -- Export --
    /// No chain exists for the requested trace.
    ExportUnknownTrace,

    // -- Storage --
    /// A storage transaction failed for a reason other than contention.
    StorageUnavailable,

    // -- Config --
    /// Configuration file or value is invalid.
    ConfigInvalid,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthMissingKey | Self::AuthUnknownKey => ErrorCategory::Auth,

            Self::RequestMissingIdempotencyKey
            | Self::RequestMalformed
            | Self::RequestTooLarge => ErrorCategory::Request,

            Self::MappingUnsupported => ErrorCategory::Mapping,

            Self::ValidationArgumentsParse
            | Self::ValidationRepairNonJson
            | Self::ValidationSemanticInvariants
            | Self::ValidationInputSchema
            | Self::ValidationOutputSchema => ErrorCategory::Validation,

            Self::ChainConflict => ErrorCategory::Chain,

            Self::QuotaFuExceeded => ErrorCategory::Quota,

            Self::ForwardFailed => ErrorCategory::Forward,

            Self::ExportUnknownTrace => ErrorCategory::Export,

            Self::StorageUnavailable => ErrorCategory::Storage,

            Self::ConfigInvalid => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"CHAIN_CONFLICT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthMissingKey => "AUTH_MISSING_KEY",
            Self::AuthUnknownKey => "AUTH_UNKNOWN_KEY",
            Self::RequestMissingIdempotencyKey => "REQUEST_MISSING_IDEMPOTENCY_KEY",
            Self::RequestMalformed => "REQUEST_MALFORMED",
            Self::RequestTooLarge => "REQUEST_TOO_LARGE",
            Self::MappingUnsupported => "MAPPING_UNSUPPORTED",
            Self::ValidationArgumentsParse => "VALIDATION_ARGUMENTS_PARSE",
            Self::ValidationRepairNonJson => "VALIDATION_REPAIR_NON_JSON",
            Self::ValidationSemanticInvariants => "VALIDATION_SEMANTIC_INVARIANTS",
            Self::ValidationInputSchema => "VALIDATION_INPUT_SCHEMA",
            Self::ValidationOutputSchema => "VALIDATION_OUTPUT_SCHEMA",
            Self::ChainConflict => "CHAIN_CONFLICT",
            Self::QuotaFuExceeded => "QUOTA_FU_EXCEEDED",
            Self::ForwardFailed => "FORWARD_FAILED",
            Self::ExportUnknownTrace => "EXPORT_UNKNOWN_TRACE",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether an exchange failing with this code still counts a Verified
    /// Exchange unit. Only forward failures are billable failures; they are
    /// embedded in a successful receipt rather than surfaced as errors.
    pub fn counts_vex(&self) -> bool {
        matches!(self, Self::ForwardFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SignetError
// ---------------------------------------------------------------------------

/// Unified Signet error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use signet_error::{ErrorCode, SignetError};
///
/// let err = SignetError::new(ErrorCode::QuotaFuExceeded, "monthly FU budget exhausted")
///     .with_context("tenant", "acme")
///     .with_context("fu_limit", 10_000);
/// ```
pub struct SignetError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl SignetError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for SignetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("SignetError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for SignetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for SignetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`SignetError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignetErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&SignetError> for SignetErrorDto {
    fn from(err: &SignetError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<SignetErrorDto> for SignetError {
    fn from(dto: SignetErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
