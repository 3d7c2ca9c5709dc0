// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage engine.
//!
//! A single mutex over the whole state is the in-process equivalent of the
//! per-trace row lock: concurrent appenders serialize, and exactly one of
//! two racers for the same hop commits.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signet_core::Receipt;
use tokio::sync::Mutex;

use crate::{
    AppendOutcome, ExchangeCommit, PutOutcome, StorageError, StoragePort, UsageTotals,
};

/// One cached idempotency response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IdempotencyRecord {
    /// The exact response to replay.
    pub response: Value,
    /// When the record was inserted (RFC 3339).
    pub created_at: String,
}

/// Full storage state, shared by the memory and file engines.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub receipts: HashMap<String, Vec<Receipt>>,
    pub idempotency: HashMap<(String, String), IdempotencyRecord>,
    pub usage: HashMap<(String, String), UsageTotals>,
}

impl StoreState {
    /// Apply one exchange commit. Returns without mutating anything when
    /// the expected hop has moved.
    pub fn apply_commit(&mut self, commit: &ExchangeCommit<'_>) -> AppendOutcome {
        let chain = self
            .receipts
            .entry(commit.receipt.trace_id.clone())
            .or_default();
        let current_hop = chain.last().map(|r| r.hop).unwrap_or(0);
        if current_hop != commit.expected_prev_hop {
            return AppendOutcome::ChainConflict { current_hop };
        }
        chain.push(commit.receipt.clone());

        self.idempotency
            .entry((
                commit.api_key.to_string(),
                commit.idempotency_key.to_string(),
            ))
            .or_insert_with(|| IdempotencyRecord {
                response: commit.response_snapshot.clone(),
                created_at: commit.receipt.ts.clone(),
            });

        let usage = self
            .usage
            .entry((commit.receipt.tenant.clone(), commit.month.to_string()))
            .or_default();
        usage.vex += commit.vex_delta;
        usage.fu += commit.fu_delta;

        AppendOutcome::Committed
    }
}

/// In-memory [`StoragePort`] engine.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<StoreState>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn append_exchange(
        &self,
        commit: ExchangeCommit<'_>,
    ) -> Result<AppendOutcome, StorageError> {
        let mut state = self.state.lock().await;
        Ok(state.apply_commit(&commit))
    }

    async fn get_chain(&self, trace_id: &str) -> Result<Vec<Receipt>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.receipts.get(trace_id).cloned().unwrap_or_default())
    }

    async fn get_last(&self, trace_id: &str) -> Result<Option<Receipt>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .receipts
            .get(trace_id)
            .and_then(|chain| chain.last().cloned()))
    }

    async fn get_idempotent(
        &self,
        api_key: &str,
        idempotency_key: &str,
    ) -> Result<Option<Value>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .idempotency
            .get(&(api_key.to_string(), idempotency_key.to_string()))
            .map(|r| r.response.clone()))
    }

    async fn put_idempotent(
        &self,
        api_key: &str,
        idempotency_key: &str,
        snapshot: &Value,
    ) -> Result<PutOutcome, StorageError> {
        let mut state = self.state.lock().await;
        let key = (api_key.to_string(), idempotency_key.to_string());
        if let Some(existing) = state.idempotency.get(&key) {
            return Ok(PutOutcome::Existing(existing.response.clone()));
        }
        state.idempotency.insert(
            key,
            IdempotencyRecord {
                response: snapshot.clone(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        Ok(PutOutcome::Inserted)
    }

    async fn get_monthly_usage(
        &self,
        tenant: &str,
        month: &str,
    ) -> Result<UsageTotals, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .usage
            .get(&(tenant.to_string(), month.to_string()))
            .copied()
            .unwrap_or_default())
    }

    async fn health(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
