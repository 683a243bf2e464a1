//! Kafka stream source and producer.

mod consumer;
mod producer;
mod record;
mod source;

pub use consumer::{KafkaConsumerBuilder, KafkaStreamSource};
pub use producer::{FlushReport, RecordProducer};
pub use record::{PollOutcome, Record};
pub use source::StreamSource;
