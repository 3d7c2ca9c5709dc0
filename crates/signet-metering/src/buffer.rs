// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bounded metering buffer and its single-consumer flusher.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Billable unit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterUnit {
    /// One verified exchange.
    Vex,
    /// One fallback repair token.
    Fu,
}

/// One usage delta emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterEvent {
    /// Tenant the usage belongs to.
    pub tenant: String,
    /// Unit kind.
    pub unit: MeterUnit,
    /// Billing item the delta rolls up into, when the tenant has one.
    pub billing_item: Option<String>,
    /// Units consumed.
    pub quantity: u64,
}

/// Usage aggregated by `(tenant, unit, billing_item)`, as handed to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedUsage {
    /// Tenant the usage belongs to.
    pub tenant: String,
    /// Unit kind.
    pub unit: MeterUnit,
    /// Billing item, if any.
    pub billing_item: Option<String>,
    /// Total units in this flush window.
    pub quantity: u64,
}

/// Errors from billing sinks.
#[derive(Debug, thiserror::Error)]
#[error("billing sink failure: {0}")]
pub struct SinkError(
    /// What went wrong, as reported by the external system.
    pub String,
);

/// Destination for flushed usage; the external billing system sits behind
/// this seam.
#[async_trait]
pub trait BillingSink: Send + Sync {
    /// Record one flushed batch.
    ///
    /// # Errors
    ///
    /// [`SinkError`] when the batch could not be recorded; the flusher
    /// retains the batch and retries with the next flush.
    async fn record(&self, batch: &[AggregatedUsage]) -> Result<(), SinkError>;
}

/// Sink that logs batches; the development default.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl BillingSink for LogSink {
    async fn record(&self, batch: &[AggregatedUsage]) -> Result<(), SinkError> {
        for entry in batch {
            info!(
                tenant = %entry.tenant,
                unit = ?entry.unit,
                billing_item = entry.billing_item.as_deref().unwrap_or(""),
                quantity = entry.quantity,
                "usage flushed"
            );
        }
        Ok(())
    }
}

/// Sink that captures batches in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<AggregatedUsage>>>,
}

impl RecordingSink {
    /// Every batch recorded so far.
    pub async fn batches(&self) -> Vec<Vec<AggregatedUsage>> {
        self.batches.lock().await.clone()
    }

    /// All recorded usage flattened across batches.
    pub async fn all(&self) -> Vec<AggregatedUsage> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl BillingSink for RecordingSink {
    async fn record(&self, batch: &[AggregatedUsage]) -> Result<(), SinkError> {
        self.batches.lock().await.push(batch.to_vec());
        Ok(())
    }
}

/// Multi-producer handle the pipeline enqueues into.
#[derive(Debug, Clone)]
pub struct BillingBuffer {
    tx: mpsc::Sender<MeterEvent>,
}

impl BillingBuffer {
    /// Enqueue a usage delta. Blocks briefly when the buffer is full;
    /// counted usage is never dropped while the flusher lives.
    pub async fn enqueue(&self, event: MeterEvent) {
        if self.tx.send(event).await.is_err() {
            // Only reachable when the flusher is already gone (shutdown
            // race); the usage counter in storage remains authoritative.
            warn!("billing buffer closed; usage event not flushed");
        }
    }
}

/// Single consumer that aggregates and drains the buffer.
pub struct Flusher {
    rx: mpsc::Receiver<MeterEvent>,
    sink: Arc<dyn BillingSink>,
    interval: Duration,
    pending: HashMap<(String, MeterUnit, Option<String>), u64>,
}

impl Flusher {
    /// Run until every producer handle is dropped, then drain and flush a
    /// final time.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(event) => self.accumulate(event),
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }
        // Channel closed: drain whatever is still queued, then flush.
        while let Ok(event) = self.rx.try_recv() {
            self.accumulate(event);
        }
        self.flush().await;
    }

    fn accumulate(&mut self, event: MeterEvent) {
        *self
            .pending
            .entry((event.tenant, event.unit, event.billing_item))
            .or_default() += event.quantity;
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch: Vec<AggregatedUsage> = self
            .pending
            .iter()
            .map(|((tenant, unit, billing_item), quantity)| AggregatedUsage {
                tenant: tenant.clone(),
                unit: *unit,
                billing_item: billing_item.clone(),
                quantity: *quantity,
            })
            .collect();
        match self.sink.record(&batch).await {
            Ok(()) => self.pending.clear(),
            Err(err) => {
                // Keep the batch; it merges into the next flush.
                warn!(error = %err, "billing flush failed; retaining batch");
            }
        }
    }
}

/// Create a bounded buffer and its flusher.
#[must_use]
pub fn metering_channel(
    capacity: usize,
    sink: Arc<dyn BillingSink>,
    interval: Duration,
) -> (BillingBuffer, Flusher) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        BillingBuffer { tx },
        Flusher {
            rx,
            sink,
            interval,
            pending: HashMap::new(),
        },
    )
}
