//! Kafka stream source built on rdkafka's `StreamConsumer`.
//!
//! Offsets are auto-committed by librdkafka; the consumer loop never does
//! its own offset bookkeeping. Partition ends are enabled so that a
//! drained partition surfaces as [`PollOutcome::PartitionEnd`] rather than
//! as an error.

use super::{PollOutcome, Record, StreamSource};
use crate::config::KafkaConfig;
use crate::{Error, KafkaError, Result};
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError as RdKafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Builder for creating a Kafka stream source.
pub struct KafkaConsumerBuilder {
    config: KafkaConfig,
}

impl KafkaConsumerBuilder {
    /// Create a new consumer builder.
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    /// librdkafka settings derived from the configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", self.config.brokers())
            .set("group.id", &self.config.consumer_group)
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                self.config.auto_commit_interval_ms.to_string(),
            )
            .set("auto.offset.reset", self.config.auto_offset_reset.as_str())
            .set(
                "session.timeout.ms",
                self.config.session_timeout_ms.to_string(),
            )
            .set(
                "enable.partition.eof",
                if self.config.enable_partition_eof {
                    "true"
                } else {
                    "false"
                },
            );

        self.config.security.apply(&mut client_config);
        client_config
    }

    /// Build the source. The returned source is not yet subscribed.
    pub fn build(self) -> Result<KafkaStreamSource> {
        let consumer: StreamConsumer = self.client_config().create().map_err(|e| match e {
            RdKafkaError::ClientCreation(message) => {
                Error::Config(format!("Failed to create consumer: {}", message))
            }
            other => Error::Kafka(KafkaError::ConnectionFailed {
                broker: self.config.brokers(),
                message: other.to_string(),
            }),
        })?;

        info!(
            group = %self.config.consumer_group,
            servers = %self.config.brokers(),
            offset_reset = self.config.auto_offset_reset.as_str(),
            "Kafka consumer created"
        );

        Ok(KafkaStreamSource {
            consumer,
            subscribed: Vec::new(),
            closed: false,
        })
    }
}

/// Stream source backed by a Kafka consumer group member.
pub struct KafkaStreamSource {
    consumer: StreamConsumer,
    subscribed: Vec<String>,
    closed: bool,
}

impl KafkaStreamSource {
    /// Convert a borrowed message to an owned record.
    fn convert_message(msg: &BorrowedMessage<'_>) -> Record {
        Record {
            payload: msg.payload().map(|v| v.to_vec()).unwrap_or_default(),
            key: msg.key().map(|k| k.to_vec()),
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            timestamp: msg.timestamp().to_millis().unwrap_or(0),
        }
    }

    /// Map a receive result onto the poll classification.
    fn classify(result: std::result::Result<Record, RdKafkaError>) -> PollOutcome {
        match result {
            Ok(record) => PollOutcome::Record(record),
            Err(RdKafkaError::PartitionEOF(partition)) => PollOutcome::PartitionEnd { partition },
            Err(e) => PollOutcome::Error(e.to_string()),
        }
    }
}

#[async_trait]
impl StreamSource for KafkaStreamSource {
    fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        if self.closed {
            return Err(Error::Kafka(KafkaError::ConsumerClosed));
        }

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&names)
            .map_err(|e| Error::Kafka(KafkaError::Subscription(e.to_string())))?;
        self.subscribed = topics.to_vec();

        info!(topics = ?self.subscribed, "Kafka consumer subscribed");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> PollOutcome {
        if self.closed {
            return PollOutcome::Error(KafkaError::ConsumerClosed.to_string());
        }

        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(result) => Self::classify(result.map(|msg| Self::convert_message(&msg))),
            Err(_) => PollOutcome::Timeout,
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Final synchronous commit of whatever auto-commit has stored so far.
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => debug!("Final offsets committed"),
            Err(RdKafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!("No offsets to commit on close")
            }
            Err(e) => warn!(error = %e, "Final offset commit failed"),
        }

        self.consumer.unsubscribe();
        info!(topics = ?self.subscribed, "Kafka consumer unsubscribed");
        Ok(())
    }
}
