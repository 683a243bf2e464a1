//! Fire-and-forget producer.
//!
//! `produce` only enqueues; delivery is confirmed by `flush`, which reports
//! how many messages were still in flight when the timeout expired.

use crate::config::{KafkaConfig, ProducerConfig};
use crate::{Error, KafkaError, Result};
use rdkafka::error::KafkaError as RdKafkaError;
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages enqueued since the producer was created
    pub enqueued: u64,
    /// Messages still awaiting delivery when the flush returned
    pub undelivered: usize,
}

impl FlushReport {
    /// True if every enqueued message was acknowledged.
    pub fn all_delivered(&self) -> bool {
        self.undelivered == 0
    }
}

/// Kafka producer with an explicit flush step.
pub struct RecordProducer {
    producer: BaseProducer,
    enqueued: u64,
}

impl RecordProducer {
    /// Create a producer against the configured brokers.
    pub fn new(kafka: &KafkaConfig, config: &ProducerConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", kafka.brokers())
            .set("message.timeout.ms", config.message_timeout_ms.to_string());
        kafka.security.apply(&mut client_config);

        let producer: BaseProducer = client_config.create().map_err(|e| match e {
            RdKafkaError::ClientCreation(message) => {
                Error::Config(format!("Failed to create producer: {}", message))
            }
            other => Error::Kafka(KafkaError::ConnectionFailed {
                broker: kafka.brokers(),
                message: other.to_string(),
            }),
        })?;

        info!(servers = %kafka.brokers(), "Kafka producer created");

        Ok(Self {
            producer,
            enqueued: 0,
        })
    }

    /// Enqueue a message. Partition is left to the partitioner.
    pub fn produce(&mut self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<()> {
        let mut record = BaseRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record)
            .map_err(|(e, _)| Error::Kafka(KafkaError::Produce(e.to_string())))?;
        self.enqueued += 1;

        // Serve delivery callbacks without blocking.
        self.producer.poll(Duration::ZERO);

        debug!(topic = %topic, bytes = payload.len(), "Message enqueued");
        Ok(())
    }

    /// Wait up to `timeout` for outstanding deliveries.
    ///
    /// Leftover messages are a warning for the operator, not an error.
    pub fn flush(&self, timeout: Duration) -> FlushReport {
        if let Err(e) = self.producer.flush(timeout) {
            debug!(error = %e, "Flush returned before all deliveries completed");
        }

        let undelivered = self.producer.in_flight_count().max(0) as usize;
        let report = FlushReport {
            enqueued: self.enqueued,
            undelivered,
        };

        if report.all_delivered() {
            info!(enqueued = report.enqueued, "All messages delivered");
        } else {
            warn!(
                undelivered = report.undelivered,
                enqueued = report.enqueued,
                "Messages were not delivered before flush timeout"
            );
        }

        report
    }
}
