// Path: crates/osd-storage/src/metrics.rs
use osd_telemetry::sinks::StorageMetricsSink;

pub fn metrics() -> &'static dyn StorageMetricsSink {
    osd_telemetry::storage_metrics()
}
