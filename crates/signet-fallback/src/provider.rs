// SPDX-License-Identifier: MIT OR Apache-2.0

//! The repair provider capability trait and its deterministic doubles.

use async_trait::async_trait;
use serde_json::Value;

use crate::RepairError;

/// What a repair attempt produced: the repaired text and the tokens the
/// provider actually consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Repaired text; treated as untrusted until re-parsed and re-validated.
    pub text: String,
    /// Tokens consumed by the provider for this repair.
    pub tokens: u64,
}

/// Narrow capability interface over the external repair model.
#[async_trait]
pub trait RepairProvider: Send + Sync {
    /// Repair `broken` into text that should parse as JSON satisfying
    /// `schema`.
    ///
    /// # Errors
    ///
    /// [`RepairError`] on transport or protocol failure. The caller never
    /// bills tokens for a failed call.
    async fn repair(&self, broken: &str, schema: &Value) -> Result<RepairOutcome, RepairError>;
}

/// Deterministic double that returns a fixed outcome regardless of input.
#[derive(Debug, Clone)]
pub struct CannedRepairProvider {
    outcome: RepairOutcome,
}

impl CannedRepairProvider {
    /// Always answer with the given text and token count.
    #[must_use]
    pub fn new(text: impl Into<String>, tokens: u64) -> Self {
        Self {
            outcome: RepairOutcome {
                text: text.into(),
                tokens,
            },
        }
    }
}

#[async_trait]
impl RepairProvider for CannedRepairProvider {
    async fn repair(&self, _broken: &str, _schema: &Value) -> Result<RepairOutcome, RepairError> {
        Ok(self.outcome.clone())
    }
}

/// Double that fails every call at the transport layer.
#[derive(Debug, Clone, Default)]
pub struct FailingRepairProvider;

#[async_trait]
impl RepairProvider for FailingRepairProvider {
    async fn repair(&self, _broken: &str, _schema: &Value) -> Result<RepairOutcome, RepairError> {
        Err(RepairError::Transport("provider unavailable".into()))
    }
}
