//! Produce command implementation.

use anyhow::{Context, Result};
use k2r_core::kafka::RecordProducer;
use k2r_core::Config;

/// Payload sent when no messages are given.
pub const DEFAULT_MESSAGE: &str = "Hello from k2r! This is my first Kafka message.";

/// Send `messages` to the configured topic and wait for delivery.
pub async fn run(config: Config, messages: Vec<String>, key: Option<String>) -> Result<()> {
    let messages = if messages.is_empty() {
        vec![DEFAULT_MESSAGE.to_string()]
    } else {
        messages
    };

    // Flushing blocks, keep it off the runtime threads.
    let report = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut producer = RecordProducer::new(&config.kafka, &config.producer)?;
        let key = key.as_deref().map(str::as_bytes);

        for message in &messages {
            producer.produce(&config.kafka.topic, key, message.as_bytes())?;
        }

        Ok(producer.flush(config.producer.flush_timeout()))
    })
    .await
    .context("Producer task panicked")??;

    if report.all_delivered() {
        println!("{} message(s) delivered successfully!", report.enqueued);
    } else {
        eprintln!("{} message(s) were not delivered", report.undelivered);
    }

    Ok(())
}
