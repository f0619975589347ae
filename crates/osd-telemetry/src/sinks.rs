// Path: crates/osd-telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured storage metrics sink, or a no-op sink.
pub fn storage_metrics() -> &'static dyn StorageMetricsSink {
    SINK.get().map(|s| s.as_storage()).unwrap_or(&NOP_SINK)
}

/// Returns the configured command metrics sink, or a no-op sink.
pub fn command_metrics() -> &'static dyn CommandMetricsSink {
    SINK.get().map(|s| s.as_command()).unwrap_or(&NOP_SINK)
}

/// Returns the configured error metrics sink, or a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().map(|s| s.as_error()).unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the attribute store and catalog.
pub trait StorageMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the number of attribute values written.
    fn inc_attr_writes(&self, count: u64);
    /// Increments the number of attribute rows deleted.
    fn inc_attr_deletes(&self, count: u64);
    /// Increments the objects created, labeled by object kind.
    fn inc_objects_created(&self, kind: &'static str);
    /// Increments the objects removed, labeled by object kind.
    fn inc_objects_removed(&self, kind: &'static str);
    /// Increments the number of operations restarted after a retryable failure.
    fn inc_retries(&self);
}
impl StorageMetricsSink for NopSink {
    fn inc_attr_writes(&self, _count: u64) {}
    fn inc_attr_deletes(&self, _count: u64) {}
    fn inc_objects_created(&self, _kind: &'static str) {}
    fn inc_objects_removed(&self, _kind: &'static str) {}
    fn inc_retries(&self) {}
}

/// A sink for metrics related to command dispatch.
pub trait CommandMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the latency of one dispatched command, labeled by service action.
    fn observe_command_latency(&self, action: &'static str, duration_secs: f64);
    /// Increments a counter of commands that completed with sense data.
    fn inc_command_sense(&self, action: &'static str, sense_key: &'static str);
    /// Adds to the counter of object data bytes moved, labeled by direction.
    fn inc_data_bytes(&self, direction: &'static str, bytes: u64);
}
impl CommandMetricsSink for NopSink {
    fn observe_command_latency(&self, _action: &'static str, _duration_secs: f64) {}
    fn inc_command_sense(&self, _action: &'static str, _sense_key: &'static str) {}
    fn inc_data_bytes(&self, _direction: &'static str, _bytes: u64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink: StorageMetricsSink + CommandMetricsSink + ErrorMetricsSink {
    fn as_storage(&self) -> &dyn StorageMetricsSink;
    fn as_command(&self) -> &dyn CommandMetricsSink;
    fn as_error(&self) -> &dyn ErrorMetricsSink;
}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T
where
    T: StorageMetricsSink + CommandMetricsSink + ErrorMetricsSink,
{
    fn as_storage(&self) -> &dyn StorageMetricsSink {
        self
    }
    fn as_command(&self) -> &dyn CommandMetricsSink {
        self
    }
    fn as_error(&self) -> &dyn ErrorMetricsSink {
        self
    }
}
