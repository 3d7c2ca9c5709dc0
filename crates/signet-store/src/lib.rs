// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Append-only receipt storage with idempotency records and usage counters."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-store
//!
//! The storage port owns receipts, idempotency records, and monthly usage
//! counters. Its central operation is [`StoragePort::append_exchange`]: a
//! single transaction that conditionally appends a receipt (losers of a
//! concurrent race get [`AppendOutcome::ChainConflict`]), upserts the
//! idempotency snapshot, and advances the usage counters — all or nothing.
//!
//! Two engines ship here: [`MemoryStorage`] for tests and
//! [`FileStorage`], the embedded single-file engine for development. A
//! networked relational engine plugs in behind the same port.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signet_core::Receipt;

/// Errors from the storage layer. Contention is not an error; it surfaces
/// as [`AppendOutcome::ChainConflict`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// The persisted state could not be decoded.
    #[error("storage corruption: {0}")]
    Corrupt(String),
    /// The DSN names no known engine.
    #[error("unrecognized storage DSN: {0}")]
    UnknownDsn(String),
}

/// Month-to-date usage counters for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Verified Exchange units.
    pub vex: u64,
    /// Fallback Unit tokens.
    pub fu: u64,
}

/// Result of the conditional chain append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The receipt was appended and counters advanced.
    Committed,
    /// Another appender won the hop; nothing was written.
    ChainConflict {
        /// The chain's current max hop at decision time.
        current_hop: u32,
    },
}

/// Result of an idempotency upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The snapshot was inserted.
    Inserted,
    /// A snapshot already existed; it is returned unchanged.
    Existing(Value),
}

/// Everything one exchange commits in a single transaction.
#[derive(Debug)]
pub struct ExchangeCommit<'a> {
    /// Max hop the appender observed; the append only proceeds if the
    /// chain still ends there.
    pub expected_prev_hop: u32,
    /// The sealed receipt to append.
    pub receipt: &'a Receipt,
    /// API key half of the idempotency pair.
    pub api_key: &'a str,
    /// Idempotency key half of the pair.
    pub idempotency_key: &'a str,
    /// The exact response body to replay for this pair.
    pub response_snapshot: &'a Value,
    /// Usage month key (`YYYY-MM`).
    pub month: &'a str,
    /// Verified Exchange units to add.
    pub vex_delta: u64,
    /// Fallback Unit tokens to add.
    pub fu_delta: u64,
}

/// The abstract storage interface the pipeline runs against.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Atomically append a receipt, upsert the idempotency record, and
    /// advance usage counters. Concurrent appenders for one trace
    /// serialize; the losers receive [`AppendOutcome::ChainConflict`] and
    /// nothing is written for them.
    async fn append_exchange(
        &self,
        commit: ExchangeCommit<'_>,
    ) -> Result<AppendOutcome, StorageError>;

    /// The ordered receipt chain for a trace (empty if unknown).
    async fn get_chain(&self, trace_id: &str) -> Result<Vec<Receipt>, StorageError>;

    /// The last receipt of a trace, if any.
    async fn get_last(&self, trace_id: &str) -> Result<Option<Receipt>, StorageError>;

    /// The cached response for an idempotency pair, if any.
    async fn get_idempotent(
        &self,
        api_key: &str,
        idempotency_key: &str,
    ) -> Result<Option<Value>, StorageError>;

    /// Insert a response snapshot unless the pair already has one.
    async fn put_idempotent(
        &self,
        api_key: &str,
        idempotency_key: &str,
        snapshot: &Value,
    ) -> Result<PutOutcome, StorageError>;

    /// Month-to-date usage for a tenant.
    async fn get_monthly_usage(
        &self,
        tenant: &str,
        month: &str,
    ) -> Result<UsageTotals, StorageError>;

    /// Liveness probe for the health endpoint.
    async fn health(&self) -> Result<(), StorageError>;
}

/// Format a timestamp into the `YYYY-MM` usage bucket key.
#[must_use]
pub fn month_key(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

/// Open a storage engine from a DSN: `memory:` or `file:<path>`.
///
/// # Errors
///
/// [`StorageError::UnknownDsn`] for unrecognized schemes; I/O and
/// corruption errors when hydrating a file engine.
pub async fn open_storage(dsn: &str) -> Result<Arc<dyn StoragePort>, StorageError> {
    if dsn == "memory:" {
        return Ok(Arc::new(MemoryStorage::new()));
    }
    if let Some(path) = dsn.strip_prefix("file:") {
        return Ok(Arc::new(FileStorage::open(path.as_ref()).await?));
    }
    Err(StorageError::UnknownDsn(dsn.to_string()))
}
