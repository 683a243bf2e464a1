//! K2R Core - Kafka to Redis recent-window pipeline
//!
//! This library consumes records from an Apache Kafka topic and keeps the
//! most recent ones in a capacity-bounded, newest-first list in Redis:
//!
//! - Single-threaded poll/classify/store loop with cooperative shutdown
//! - Recent window that degrades instead of failing when the store is down
//! - Circuit breaker around remote store calls
//! - Prometheus metrics and component health tracking

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod kafka;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use error::{CacheError, KafkaError};
pub use error::{Error, Result};
