//! Error types for k2r core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Only setup-time failures travel through these types; steady-state
//! broker and cache failures are absorbed by the consumer loop.

use thiserror::Error;

/// Result type alias for k2r operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for k2r.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka-related error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Cache-related error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),
}

/// Kafka-specific errors.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Failed to create a client against the brokers
    #[error("Connection failed to {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Topic subscription rejected
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Message could not be enqueued for delivery
    #[error("Produce failed: {0}")]
    Produce(String),

    /// Consumer closed
    #[error("Consumer closed")]
    ConsumerClosed,
}

/// Remote list store errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Store unreachable or handshake rejected
    #[error("Connection failed to {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Store address could not be parsed
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    /// A single remote command failed
    #[error("{command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    /// Calls are suspended after repeated failures
    #[error("Circuit open, store calls suspended")]
    CircuitOpen,
}

impl CacheError {
    pub(crate) fn command(command: &'static str, err: impl std::fmt::Display) -> Self {
        CacheError::Command {
            command,
            message: err.to_string(),
        }
    }
}

// Conversion implementations for external error types

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
