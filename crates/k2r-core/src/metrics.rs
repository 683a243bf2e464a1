//! Prometheus metrics for the consumer loop and the recent window.

use crate::cache::{CacheHealth, StoreOutcome};
use crate::Result;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Pipeline counters and gauges, registered in a private registry.
pub struct PipelineMetrics {
    registry: Registry,

    // === COUNTERS ===
    records_consumed: IntCounter,
    poll_timeouts: IntCounter,
    partition_ends: IntCounter,
    poll_errors: IntCounter,
    cache_writes: IntCounter,
    cache_write_failures: IntCounter,
    cache_reads: IntCounter,

    // === GAUGES ===
    window_length: IntGauge,
    cache_healthy: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl PipelineMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let metrics = Self {
            records_consumed: counter(
                &registry,
                "k2r_records_consumed_total",
                "Records received from Kafka",
            )?,
            poll_timeouts: counter(
                &registry,
                "k2r_poll_timeouts_total",
                "Polls that returned without a record",
            )?,
            partition_ends: counter(
                &registry,
                "k2r_partition_ends_total",
                "End-of-partition notices",
            )?,
            poll_errors: counter(&registry, "k2r_poll_errors_total", "Transient poll errors")?,
            cache_writes: counter(
                &registry,
                "k2r_cache_writes_total",
                "Records inserted into the recent window",
            )?,
            cache_write_failures: counter(
                &registry,
                "k2r_cache_write_failures_total",
                "Writes skipped or left untrimmed because the store failed",
            )?,
            cache_reads: counter(
                &registry,
                "k2r_cache_reads_total",
                "Reads of the recent window",
            )?,
            window_length: gauge(
                &registry,
                "k2r_window_length",
                "Window length after the last successful write",
            )?,
            cache_healthy: gauge(
                &registry,
                "k2r_cache_healthy",
                "1 when the recent window is healthy, 0 when degraded",
            )?,
            registry,
        };

        metrics.cache_healthy.set(1);
        Ok(metrics)
    }

    /// Record a consumed record.
    pub fn record_consumed(&self) {
        self.records_consumed.inc();
    }

    /// Record an empty poll.
    pub fn record_timeout(&self) {
        self.poll_timeouts.inc();
    }

    /// Record an end-of-partition notice.
    pub fn record_partition_end(&self) {
        self.partition_ends.inc();
    }

    /// Record a transient poll error.
    pub fn record_poll_error(&self) {
        self.poll_errors.inc();
    }

    /// Record the outcome of a window write.
    pub fn record_store(&self, outcome: StoreOutcome) {
        match outcome {
            StoreOutcome::Stored { length } => {
                self.cache_writes.inc();
                self.window_length.set(length as i64);
            }
            StoreOutcome::TrimDeferred => {
                self.cache_writes.inc();
                self.cache_write_failures.inc();
            }
            StoreOutcome::Skipped => self.cache_write_failures.inc(),
        }
    }

    /// Record a window read.
    pub fn record_read(&self) {
        self.cache_reads.inc();
    }

    /// Update the cache health gauge.
    pub fn set_cache_health(&self, health: &CacheHealth) {
        self.cache_healthy.set(i64::from(health.is_healthy()));
    }

    // === GETTERS ===

    /// Total records consumed.
    pub fn records_consumed(&self) -> u64 {
        self.records_consumed.get()
    }

    /// Total poll timeouts.
    pub fn poll_timeouts(&self) -> u64 {
        self.poll_timeouts.get()
    }

    /// Total partition-end notices.
    pub fn partition_ends(&self) -> u64 {
        self.partition_ends.get()
    }

    /// Total poll errors.
    pub fn poll_errors(&self) -> u64 {
        self.poll_errors.get()
    }

    /// Total window inserts.
    pub fn cache_writes(&self) -> u64 {
        self.cache_writes.get()
    }

    /// Total failed or partial window writes.
    pub fn cache_write_failures(&self) -> u64 {
        self.cache_write_failures.get()
    }

    /// Total window reads.
    pub fn cache_reads(&self) -> u64 {
        self.cache_reads.get()
    }

    /// Window length after the last successful write.
    pub fn window_length(&self) -> i64 {
        self.window_length.get()
    }

    /// Export all metrics in Prometheus text format.
    pub fn export_prometheus_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Metrics(e.to_string()))
    }
}
