// Path: crates/osd-telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter, register_int_counter_vec,
    HistogramVec, IntCounter, IntCounterVec,
};

// --- Metric Statics ---
// Initialized exactly once by `install`.

static STORAGE_ATTR_WRITES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORAGE_ATTR_DELETES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORAGE_RETRIES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static OBJECTS_CREATED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static OBJECTS_REMOVED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static COMMAND_LATENCY_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static COMMAND_SENSE_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static DATA_BYTES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

// Metrics are only reachable through the sink returned by `install`, so a
// missing collector means nothing to record.
macro_rules! with_metric {
    ($metric:ident, |$m:ident| $body:expr) => {
        if let Some($m) = $metric.get() {
            $body;
        }
    };
}

impl StorageMetricsSink for PrometheusSink {
    fn inc_attr_writes(&self, count: u64) {
        with_metric!(STORAGE_ATTR_WRITES_TOTAL, |m| m.inc_by(count));
    }
    fn inc_attr_deletes(&self, count: u64) {
        with_metric!(STORAGE_ATTR_DELETES_TOTAL, |m| m.inc_by(count));
    }
    fn inc_objects_created(&self, kind: &'static str) {
        with_metric!(OBJECTS_CREATED_TOTAL, |m| m.with_label_values(&[kind]).inc());
    }
    fn inc_objects_removed(&self, kind: &'static str) {
        with_metric!(OBJECTS_REMOVED_TOTAL, |m| m.with_label_values(&[kind]).inc());
    }
    fn inc_retries(&self) {
        with_metric!(STORAGE_RETRIES_TOTAL, |m| m.inc());
    }
}

impl CommandMetricsSink for PrometheusSink {
    fn observe_command_latency(&self, action: &'static str, duration_secs: f64) {
        with_metric!(COMMAND_LATENCY_SECONDS, |m| m
            .with_label_values(&[action])
            .observe(duration_secs));
    }
    fn inc_command_sense(&self, action: &'static str, sense_key: &'static str) {
        with_metric!(COMMAND_SENSE_TOTAL, |m| m
            .with_label_values(&[action, sense_key])
            .inc());
    }
    fn inc_data_bytes(&self, direction: &'static str, bytes: u64) {
        with_metric!(DATA_BYTES_TOTAL, |m| m
            .with_label_values(&[direction])
            .inc_by(bytes));
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        with_metric!(ERRORS_TOTAL, |m| m.with_label_values(&[kind, variant]).inc());
    }
}

fn already() -> prometheus::Error {
    prometheus::Error::Msg("prometheus sink already installed".into())
}

/// Registers all Prometheus collectors and returns a static reference to the sink.
/// Calling it a second time fails.
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    STORAGE_ATTR_WRITES_TOTAL
        .set(register_int_counter!(
            "osd_storage_attr_writes_total",
            "Total attribute values written."
        )?)
        .map_err(|_| already())?;
    STORAGE_ATTR_DELETES_TOTAL
        .set(register_int_counter!(
            "osd_storage_attr_deletes_total",
            "Total attribute rows deleted."
        )?)
        .map_err(|_| already())?;
    STORAGE_RETRIES_TOTAL
        .set(register_int_counter!(
            "osd_storage_retries_total",
            "Total store operations restarted after a retryable failure."
        )?)
        .map_err(|_| already())?;
    OBJECTS_CREATED_TOTAL
        .set(register_int_counter_vec!(
            "osd_objects_created_total",
            "Total objects created, by kind.",
            &["kind"]
        )?)
        .map_err(|_| already())?;
    OBJECTS_REMOVED_TOTAL
        .set(register_int_counter_vec!(
            "osd_objects_removed_total",
            "Total objects removed, by kind.",
            &["kind"]
        )?)
        .map_err(|_| already())?;
    COMMAND_LATENCY_SECONDS
        .set(register_histogram_vec!(
            "osd_command_latency_seconds",
            "Latency of dispatched commands.",
            &["action"],
            exponential_buckets(0.0001, 2.0, 16)?
        )?)
        .map_err(|_| already())?;
    COMMAND_SENSE_TOTAL
        .set(register_int_counter_vec!(
            "osd_command_sense_total",
            "Total commands that returned sense data.",
            &["action", "sense_key"]
        )?)
        .map_err(|_| already())?;
    DATA_BYTES_TOTAL
        .set(register_int_counter_vec!(
            "osd_data_bytes_total",
            "Total object data bytes transferred.",
            &["direction"]
        )?)
        .map_err(|_| already())?;
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "osd_errors_total",
            "Total number of errors, categorized by type and variant.",
            &["kind", "variant"]
        )?)
        .map_err(|_| already())?;

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_is_silent_before_install() {
        PrometheusSink.inc_attr_writes(1);
        PrometheusSink.observe_command_latency("write", 0.01);
    }
}
