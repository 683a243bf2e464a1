//! The poll/classify/store state machine.
//!
//! One logical thread of control: a single bounded poll per cycle, and a
//! record is fully processed before the next poll. Shutdown is
//! cooperative. The cancellation token is checked at the top of each
//! cycle, so an in-flight cycle always completes and shutdown latency is
//! bounded by one poll timeout plus one record's processing.

use super::{LoopObserver, TracingObserver};
use crate::cache::{ListStore, RecentWindow, RedisListStore};
use crate::config::Config;
use crate::health::{HealthCheck, KAFKA_COMPONENT};
use crate::kafka::{PollOutcome, Record, StreamSource};
use crate::metrics::PipelineMetrics;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Polling
    Running,
    /// Shutdown requested, finishing the current cycle
    Stopping,
    /// Subscription released
    Closed,
}

/// Loop parameters.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Topics to subscribe to
    pub topics: Vec<String>,
    /// Bounded wait per poll
    pub poll_timeout: Duration,
    /// Records read back after each store
    pub display_count: usize,
}

impl LoopSettings {
    /// Settings taken from a full configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            topics: vec![config.kafka.topic.clone()],
            poll_timeout: config.kafka.poll_timeout(),
            display_count: config.cache.display_count,
        }
    }
}

/// Per-run tallies of poll outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Records received and handed to the window
    pub records: u64,
    /// Polls that timed out
    pub timeouts: u64,
    /// End-of-partition notices
    pub partition_ends: u64,
    /// Transient poll errors
    pub errors: u64,
}

/// Consumer loop over a stream source and a recent window.
pub struct ConsumerLoop<S: StreamSource, L: ListStore = RedisListStore> {
    source: S,
    window: Arc<RecentWindow<L>>,
    settings: LoopSettings,
    shutdown: CancellationToken,
    state: ConsumerState,
    summary: LoopSummary,
    metrics: Arc<PipelineMetrics>,
    health: Arc<HealthCheck>,
    observer: Box<dyn LoopObserver>,
}

impl<S: StreamSource, L: ListStore> ConsumerLoop<S, L> {
    /// Create a loop. It starts polling only when [`run`](Self::run) is called.
    pub fn new(source: S, window: Arc<RecentWindow<L>>, settings: LoopSettings) -> Result<Self> {
        Ok(Self {
            source,
            window,
            settings,
            shutdown: CancellationToken::new(),
            state: ConsumerState::Running,
            summary: LoopSummary::default(),
            metrics: Arc::new(PipelineMetrics::new()?),
            health: Arc::new(HealthCheck::for_pipeline()),
            observer: Box::new(TracingObserver),
        })
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Report to the given observer instead of the tracing default.
    pub fn with_observer(mut self, observer: impl LoopObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Share metrics with other components (e.g. an HTTP exporter).
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share health state with other components.
    pub fn with_health(mut self, health: Arc<HealthCheck>) -> Self {
        self.health = health;
        self
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        match self.state {
            ConsumerState::Running if self.shutdown.is_cancelled() => ConsumerState::Stopping,
            state => state,
        }
    }

    /// Tallies so far.
    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Health handle.
    pub fn health(&self) -> &Arc<HealthCheck> {
        &self.health
    }

    /// Subscribe, run until shutdown, then release the subscription.
    ///
    /// Only subscription failures are returned as errors; every per-cycle
    /// failure is reported to the observer and the loop carries on.
    pub async fn run(&mut self) -> Result<LoopSummary> {
        if self.state == ConsumerState::Closed {
            return Err(crate::Error::Kafka(crate::KafkaError::ConsumerClosed));
        }

        if let Err(e) = self.source.subscribe(&self.settings.topics) {
            self.health
                .mark_unhealthy(KAFKA_COMPONENT, &format!("Subscribe failed: {}", e));
            self.close_source();
            return Err(e);
        }
        self.health.mark_healthy(KAFKA_COMPONENT);
        self.health.record_cache(&self.window.health());
        self.health.loop_started();

        info!(
            topics = ?self.settings.topics,
            poll_timeout_ms = self.settings.poll_timeout.as_millis() as u64,
            capacity = self.window.capacity(),
            "Consumer loop started"
        );

        while !self.shutdown.is_cancelled() {
            let outcome = self.source.poll(self.settings.poll_timeout).await;
            self.handle(outcome).await;
        }

        self.state = ConsumerState::Stopping;
        info!("Shutdown signal received, closing consumer");
        self.observer.on_shutdown();

        self.close_source();
        self.health.loop_stopped();

        info!(
            records = self.summary.records,
            timeouts = self.summary.timeouts,
            partition_ends = self.summary.partition_ends,
            errors = self.summary.errors,
            "Consumer loop stopped"
        );
        Ok(self.summary)
    }

    async fn handle(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Record(record) => self.handle_record(record).await,
            PollOutcome::Timeout => {
                self.summary.timeouts += 1;
                self.metrics.record_timeout();
            }
            PollOutcome::PartitionEnd { partition } => {
                self.summary.partition_ends += 1;
                self.metrics.record_partition_end();
                self.health.mark_healthy(KAFKA_COMPONENT);
                self.observer.on_partition_end(partition);
            }
            PollOutcome::Error(detail) => {
                self.summary.errors += 1;
                self.metrics.record_poll_error();
                self.health.mark_degraded(KAFKA_COMPONENT, &detail);
                self.observer.on_poll_error(&detail);
            }
        }
    }

    async fn handle_record(&mut self, record: Record) {
        self.summary.records += 1;
        self.metrics.record_consumed();
        self.health.mark_healthy(KAFKA_COMPONENT);

        let outcome = self.window.store(&record.payload).await;
        self.metrics.record_store(outcome);
        debug!(offset = record.offset, outcome = ?outcome, "Record stored");

        let recent = self.window.recent(self.settings.display_count).await;
        self.metrics.record_read();

        let cache_health = self.window.health();
        self.metrics.set_cache_health(&cache_health);
        self.health.record_cache(&cache_health);

        self.observer.on_record(&record, &recent);
    }

    fn close_source(&mut self) {
        if let Err(e) = self.source.close() {
            warn!(error = %e, "Error while closing consumer");
        }
        self.state = ConsumerState::Closed;
    }
}
