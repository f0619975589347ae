// Path: crates/osd-target/tests/telemetry_e2e.rs

mod common;

use anyhow::{anyhow, Result};
use common::*;
use osd_target::{CdbBuilder, ServiceAction};
use osd_telemetry::sinks::SINK;

fn counter(families: &[prometheus::proto::MetricFamily], name: &str, label: (&str, &str)) -> u64 {
    families
        .iter()
        .filter(|f| f.get_name() == name)
        .flat_map(|f| f.get_metric())
        .filter(|m| {
            m.get_label()
                .iter()
                .any(|l| l.get_name() == label.0 && l.get_value() == label.1)
        })
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

#[test]
fn commands_feed_logs_and_metrics() -> Result<()> {
    // 1. Opt into JSON logs and the Prometheus backend.
    osd_telemetry::init::init_tracing_with("warn")?;
    let sink = osd_telemetry::prometheus::install()?;
    SINK.set(sink).map_err(|_| anyhow!("metrics sink already set"))?;

    // 2. Run a handful of commands, one of them failing.
    let mut h = Harness::new()?;
    let pid = h.create_partition()?;
    let oid = h.create_object(pid)?;
    h.ok(
        CdbBuilder::new(ServiceAction::Write).pid(pid).oid(oid).length(4),
        b"data",
    )?;
    h.fails(CdbBuilder::new(ServiceAction::RemovePartition).pid(pid), &[])?;

    // 3. The counters saw them.
    let families = prometheus::gather();
    assert!(counter(&families, "osd_objects_created_total", ("kind", "user_object")) >= 1);
    assert!(counter(&families, "osd_objects_created_total", ("kind", "partition")) >= 1);
    assert_eq!(
        counter(&families, "osd_command_sense_total", ("action", "remove_partition")),
        1
    );
    assert_eq!(
        counter(&families, "osd_errors_total", ("variant", "OSD_NOT_EMPTY")),
        1
    );
    assert!(counter(&families, "osd_data_bytes_total", ("direction", "out")) >= 4);
    assert!(families
        .iter()
        .any(|f| f.get_name() == "osd_command_latency_seconds"));
    Ok(())
}
