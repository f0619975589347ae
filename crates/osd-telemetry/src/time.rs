// Path: crates/osd-telemetry/src/time.rs
use crate::sinks::CommandMetricsSink;
use std::time::Instant;

/// Records the lifetime of a command into `CommandMetricsSink` on drop.
pub struct Timer<'a> {
    sink: &'a dyn CommandMetricsSink,
    action: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(sink: &'a dyn CommandMetricsSink, action: &'static str) -> Self {
        Self {
            sink,
            action,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_command_latency(self.action, self.start.elapsed().as_secs_f64());
    }
}
