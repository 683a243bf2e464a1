//! Subcommand implementations and shared override flags.

pub mod consume;
pub mod produce;
pub mod recent;
pub mod status;

use clap::{Args, ValueEnum};
use k2r_core::Config;

/// Backend holding the recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Redis list at `cache.url`
    Redis,
    /// In-process list, lost on exit
    Memory,
}

/// Kafka overrides applied on top of the config file.
#[derive(Debug, Default, Args)]
pub struct KafkaArgs {
    /// Override Kafka bootstrap servers (comma separated)
    #[arg(long, env = "K2R_BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: Option<String>,

    /// Override Kafka topic
    #[arg(long, env = "K2R_TOPIC")]
    pub topic: Option<String>,

    /// Override consumer group
    #[arg(long, env = "K2R_CONSUMER_GROUP")]
    pub consumer_group: Option<String>,
}

impl KafkaArgs {
    /// Write the given overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(servers) = &self.bootstrap_servers {
            config.kafka.bootstrap_servers = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .collect();
        }
        if let Some(topic) = &self.topic {
            config.kafka.topic = topic.clone();
        }
        if let Some(group) = &self.consumer_group {
            config.kafka.consumer_group = group.clone();
        }
    }
}

/// Recent-window overrides applied on top of the config file.
#[derive(Debug, Default, Args)]
pub struct CacheArgs {
    /// Override the store URL (e.g. redis://127.0.0.1:6379)
    #[arg(long, env = "K2R_CACHE_URL")]
    pub cache_url: Option<String>,

    /// Override the list key
    #[arg(long, env = "K2R_CACHE_KEY")]
    pub cache_key: Option<String>,

    /// Override the window capacity
    #[arg(long, env = "K2R_CAPACITY")]
    pub capacity: Option<usize>,

    /// Override how many records are shown after each write
    #[arg(long, env = "K2R_DISPLAY_COUNT")]
    pub display_count: Option<usize>,
}

impl CacheArgs {
    /// Write the given overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.cache_url {
            config.cache.url = url.clone();
        }
        if let Some(key) = &self.cache_key {
            config.cache.key = key.clone();
        }
        if let Some(capacity) = self.capacity {
            config.cache.capacity = capacity;
        }
        if let Some(display_count) = self.display_count {
            config.cache.display_count = display_count;
        }
    }
}

/// Console rendering of a window read, numbered newest first.
pub fn render_recent(key: &str, recent: &[Vec<u8>]) -> String {
    let mut out = format!("Recent {} in cache:", key);
    for (i, item) in recent.iter().enumerate() {
        out.push_str(&format!("\n  {}. {}", i + 1, String::from_utf8_lossy(item)));
    }
    out
}
