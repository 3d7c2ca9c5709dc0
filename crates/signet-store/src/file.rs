// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded single-file storage engine.
//!
//! The whole state lives in one JSON document. Every commit rewrites the
//! document to a sibling temp file and renames it into place, so a crash
//! leaves either the old state or the new state, never a torn write. The
//! mutex is held across the persist, which serializes commits exactly like
//! the in-memory engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signet_core::Receipt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::memory::{IdempotencyRecord, StoreState};
use crate::{
    AppendOutcome, ExchangeCommit, PutOutcome, StorageError, StoragePort, UsageTotals,
};

/// Single-file [`StoragePort`] engine for development deployments.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<StoreState>,
}

/// On-disk document shape. Tuple map keys do not survive JSON, so the
/// idempotency and usage tables flatten into row lists.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    receipts: HashMap<String, Vec<Receipt>>,
    idempotency: Vec<IdempotencyRow>,
    usage: Vec<UsageRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdempotencyRow {
    api_key: String,
    idempotency_key: String,
    response: Value,
    created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageRow {
    tenant: String,
    month: String,
    vex: u64,
    fu: u64,
}

impl FileStorage {
    /// Open (or create) the state file at `path` and hydrate it.
    ///
    /// # Errors
    ///
    /// I/O failures, or [`StorageError::Corrupt`] when the file does not
    /// decode.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let persisted: PersistedState = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                hydrate(persisted)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), traces = state.receipts.len(), "storage hydrated");
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StorageError> {
        let persisted = dehydrate(state);
        let bytes =
            serde_json::to_vec(&persisted).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn hydrate(persisted: PersistedState) -> StoreState {
    let mut state = StoreState {
        receipts: persisted.receipts,
        ..StoreState::default()
    };
    for row in persisted.idempotency {
        state.idempotency.insert(
            (row.api_key, row.idempotency_key),
            IdempotencyRecord {
                response: row.response,
                created_at: row.created_at,
            },
        );
    }
    for row in persisted.usage {
        state.usage.insert(
            (row.tenant, row.month),
            UsageTotals {
                vex: row.vex,
                fu: row.fu,
            },
        );
    }
    state
}

fn dehydrate(state: &StoreState) -> PersistedState {
    PersistedState {
        receipts: state.receipts.clone(),
        idempotency: state
            .idempotency
            .iter()
            .map(|((api_key, idempotency_key), record)| IdempotencyRow {
                api_key: api_key.clone(),
                idempotency_key: idempotency_key.clone(),
                response: record.response.clone(),
                created_at: record.created_at.clone(),
            })
            .collect(),
        usage: state
            .usage
            .iter()
            .map(|((tenant, month), totals)| UsageRow {
                tenant: tenant.clone(),
                month: month.clone(),
                vex: totals.vex,
                fu: totals.fu,
            })
            .collect(),
    }
}

#[async_trait]
impl StoragePort for FileStorage {
    async fn append_exchange(
        &self,
        commit: ExchangeCommit<'_>,
    ) -> Result<AppendOutcome, StorageError> {
        let mut state = self.state.lock().await;
        let outcome = state.apply_commit(&commit);
        if outcome == AppendOutcome::Committed {
            self.persist(&state).await?;
        }
        Ok(outcome)
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
        self.persist(&state).await?;
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
        // The state directory must still be writable.
        match self.path.parent() {
            Some(dir) => {
                tokio::fs::metadata(dir).await?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use signet_core::{PolicyResult, ReceiptBuilder};

    fn sealed_receipt(trace: &str, hop: u32) -> Receipt {
        let mut r = ReceiptBuilder::new(trace, hop, "acme")
            .ts("2026-08-01T00:00:00.000000Z")
            .payload("sha256:deadbeef", r#"{"x":1}"#)
            .policy(PolicyResult::allow())
            .build();
        r.receipt_hash = r.compute_hash().unwrap();
        r
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signet.json");
        let receipt = sealed_receipt("t1", 1);
        let snapshot = json!({"trace_id": "t1"});

        {
            let store = FileStorage::open(&path).await.unwrap();
            let outcome = store
                .append_exchange(ExchangeCommit {
                    expected_prev_hop: 0,
                    receipt: &receipt,
                    api_key: "key-1",
                    idempotency_key: "idem-1",
                    response_snapshot: &snapshot,
                    month: "2026-08",
                    vex_delta: 1,
                    fu_delta: 9,
                })
                .await
                .unwrap();
            assert_eq!(outcome, AppendOutcome::Committed);
        }

        let reopened = FileStorage::open(&path).await.unwrap();
        let chain = reopened.get_chain("t1").await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0], receipt);
        assert_eq!(
            reopened.get_idempotent("key-1", "idem-1").await.unwrap(),
            Some(snapshot)
        );
        assert_eq!(
            reopened.get_monthly_usage("acme", "2026-08").await.unwrap(),
            UsageTotals { vex: 1, fu: 9 }
        );
    }

    #[tokio::test]
    async fn conflict_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signet.json");
        let store = FileStorage::open(&path).await.unwrap();
        let receipt = sealed_receipt("t1", 1);
        let snapshot = json!({});

        store
            .append_exchange(ExchangeCommit {
                expected_prev_hop: 0,
                receipt: &receipt,
                api_key: "k",
                idempotency_key: "a",
                response_snapshot: &snapshot,
                month: "2026-08",
                vex_delta: 1,
                fu_delta: 0,
            })
            .await
            .unwrap();

        let loser = sealed_receipt("t1", 1);
        let outcome = store
            .append_exchange(ExchangeCommit {
                expected_prev_hop: 0,
                receipt: &loser,
                api_key: "k",
                idempotency_key: "b",
                response_snapshot: &snapshot,
                month: "2026-08",
                vex_delta: 1,
                fu_delta: 0,
            })
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::ChainConflict { current_hop: 1 });

        let reopened = FileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get_chain("t1").await.unwrap().len(), 1);
        assert_eq!(
            reopened.get_monthly_usage("acme", "2026-08").await.unwrap().vex,
            1
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signet.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(matches!(
            FileStorage::open(&path).await,
            Err(StorageError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.json");
        let store = FileStorage::open(&path).await.unwrap();
        assert!(store.get_chain("t").await.unwrap().is_empty());
        assert!(store.health().await.is_ok());
    }
}
