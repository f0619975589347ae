// Path: crates/osd-telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # OSD Telemetry
//!
//! Observability for the object storage target: structured logging
//! initialization and abstract metrics sinks, with a Prometheus backend.

/// The initialization routine for global structured logging.
pub mod init;
/// The concrete implementation of metrics sinks using the `prometheus` crate.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) that define the contract for metrics reporting.
pub mod sinks;
/// A simple RAII timer for measuring command latency.
pub mod time;

// Re-export the public helper functions for easy access to the global sinks.
pub use sinks::{command_metrics, error_metrics, storage_metrics};
