//! Telemetry sink for the consumer loop.

use crate::kafka::Record;
use tracing::{error, info};

/// Receives what the consumer loop surfaces each cycle.
///
/// All methods default to doing nothing, so sinks implement only what
/// they display.
pub trait LoopObserver: Send {
    /// A record was stored; `recent` is the window read back afterwards.
    fn on_record(&mut self, _record: &Record, _recent: &[Vec<u8>]) {}

    /// A partition was drained.
    fn on_partition_end(&mut self, _partition: i32) {}

    /// The broker client reported a transient error.
    fn on_poll_error(&mut self, _detail: &str) {}

    /// Shutdown was observed; the subscription is about to be released.
    fn on_shutdown(&mut self) {}
}

/// Observer that reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoopObserver for TracingObserver {
    fn on_record(&mut self, record: &Record, recent: &[Vec<u8>]) {
        let newest: Vec<String> = recent
            .iter()
            .map(|item| String::from_utf8_lossy(item).into_owned())
            .collect();

        info!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            payload = %record.payload_str(),
            recent = ?newest,
            "Record received"
        );
    }

    fn on_partition_end(&mut self, partition: i32) {
        info!(partition, "Reached end of partition");
    }

    fn on_poll_error(&mut self, detail: &str) {
        error!(error = %detail, "Consumer error");
    }
}
