// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Bounded usage-metering buffer and reserved-capacity overage accounting."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # signet-metering
//!
//! Pipelines push [`MeterEvent`]s into a bounded multi-producer
//! [`BillingBuffer`]; one [`Flusher`] task aggregates them and drains to a
//! [`BillingSink`] on an interval and on shutdown. The buffer applies
//! backpressure when full — counted usage is never dropped. Reserved
//! capacity and tiered overages are computed at query time by
//! [`overage_breakdown`].

mod buffer;
mod reserved;

pub use buffer::{
    AggregatedUsage, BillingBuffer, BillingSink, Flusher, LogSink, MeterEvent, MeterUnit,
    RecordingSink, SinkError, metering_channel,
};
pub use reserved::{TierCharge, UsageReport, overage_breakdown, usage_report};
