// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Structured tracing initialisation and in-process pipeline metrics."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-telemetry
//!
//! One-call tracing setup for the daemon plus a small lock-based metrics
//! collector for exchange outcomes. Exposition formats (Prometheus, OTLP)
//! live outside this crate; the collector's snapshot is what an exporter
//! would read.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// `level` overrides the default filter; the `RUST_LOG` environment
/// variable wins over both. Calling this twice is a no-op (the second
/// attempt fails quietly), which keeps tests that race on initialisation
/// harmless.
pub fn init_tracing(level: Option<&str>) {
    let default = level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// Pipeline metrics
// ---------------------------------------------------------------------------

/// Counters for exchange pipeline outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Exchanges that produced a signed receipt.
    pub exchanges_total: u64,
    /// Responses served from the idempotency cache.
    pub replays_total: u64,
    /// Exchanges whose arguments came from fallback repair.
    pub fallback_total: u64,
    /// Receipts recording a policy denial.
    pub policy_denials_total: u64,
    /// Receipts recording a forward error.
    pub forward_errors_total: u64,
    /// Exchanges rejected before a receipt existed.
    pub rejections_total: u64,
}

/// Shared, cheaply clonable metrics collector.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl PipelineMetrics {
    /// Creates a zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed exchange and its notable attributes.
    pub fn record_exchange(&self, fallback_used: bool, policy_denied: bool, forward_error: bool) {
        let mut m = self.inner.lock().expect("metrics lock");
        m.exchanges_total += 1;
        if fallback_used {
            m.fallback_total += 1;
        }
        if policy_denied {
            m.policy_denials_total += 1;
        }
        if forward_error {
            m.forward_errors_total += 1;
        }
    }

    /// Record an idempotent replay.
    pub fn record_replay(&self) {
        self.inner.lock().expect("metrics lock").replays_total += 1;
    }

    /// Record an exchange rejected before a receipt was created.
    pub fn record_rejection(&self) {
        self.inner.lock().expect("metrics lock").rejections_total += 1;
    }

    /// Copy out the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.inner.lock().expect("metrics lock")
    }

    /// Log the current counters at info level.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            exchanges = snapshot.exchanges_total,
            replays = snapshot.replays_total,
            fallbacks = snapshot.fallback_total,
            policy_denials = snapshot.policy_denials_total,
            forward_errors = snapshot.forward_errors_total,
            rejections = snapshot.rejections_total,
            "pipeline metrics"
        );
    }
}
