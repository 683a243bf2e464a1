//! Configuration structures for k2r.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use redis::IntoConnectionInfo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Kafka configuration
    pub kafka: KafkaConfig,

    /// Recent-window cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Producer configuration
    #[serde(default)]
    pub producer: ProducerConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Kafka consumer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: Vec<String>,

    /// Topic to consume from
    pub topic: String,

    /// Consumer group ID
    pub consumer_group: String,

    /// Bounded wait for a single poll in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,

    /// Auto commit interval in milliseconds
    #[serde(default = "default_auto_commit_interval_ms")]
    pub auto_commit_interval_ms: u32,

    /// Emit a notice when a partition is drained
    #[serde(default = "default_true")]
    pub enable_partition_eof: bool,

    /// Where a never-before-seen group starts reading
    #[serde(default)]
    pub auto_offset_reset: OffsetReset,

    /// Security configuration
    #[serde(default)]
    pub security: KafkaSecurityConfig,
}

impl KafkaConfig {
    /// Poll timeout as a `Duration`.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Comma-joined broker list, as librdkafka expects it.
    pub fn brokers(&self) -> String {
        self.bootstrap_servers.join(",")
    }
}

/// Kafka auto offset reset strategy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Start from earliest offset
    #[default]
    Earliest,
    /// Start from latest offset
    Latest,
}

impl OffsetReset {
    /// librdkafka value for `auto.offset.reset`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl std::str::FromStr for OffsetReset {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(crate::Error::Config(format!(
                "auto_offset_reset must be 'earliest' or 'latest', got '{}'",
                other
            ))),
        }
    }
}

/// Kafka security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KafkaSecurityConfig {
    /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT)
    pub protocol: Option<String>,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    pub sasl_mechanism: Option<String>,

    /// SASL username
    pub sasl_username: Option<String>,

    /// SASL password
    pub sasl_password: Option<String>,

    /// SSL CA certificate location
    pub ssl_ca_location: Option<PathBuf>,

    /// SSL client certificate location
    pub ssl_cert_location: Option<PathBuf>,

    /// SSL client key location
    pub ssl_key_location: Option<PathBuf>,
}

impl KafkaSecurityConfig {
    /// Apply the configured settings to a librdkafka client config.
    pub fn apply(&self, client_config: &mut rdkafka::ClientConfig) {
        if let Some(ref protocol) = self.protocol {
            client_config.set("security.protocol", protocol);
        }
        if let Some(ref mechanism) = self.sasl_mechanism {
            client_config.set("sasl.mechanism", mechanism);
        }
        if let Some(ref username) = self.sasl_username {
            client_config.set("sasl.username", username);
        }
        if let Some(ref password) = self.sasl_password {
            client_config.set("sasl.password", password);
        }
        if let Some(ref path) = self.ssl_ca_location {
            client_config.set("ssl.ca.location", path.to_string_lossy().as_ref());
        }
        if let Some(ref path) = self.ssl_cert_location {
            client_config.set("ssl.certificate.location", path.to_string_lossy().as_ref());
        }
        if let Some(ref path) = self.ssl_key_location {
            client_config.set("ssl.key.location", path.to_string_lossy().as_ref());
        }
    }
}

/// Recent-window cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Store address (redis://host:port/db)
    #[serde(default = "default_cache_url")]
    pub url: String,

    /// List key holding the window
    #[serde(default = "default_cache_key")]
    pub key: String,

    /// Window capacity N
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Records read back after every stored record
    #[serde(default = "default_display_count")]
    pub display_count: usize,

    /// Connection handshake timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reply timeout for each LPUSH / LTRIM / LRANGE, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Consecutive store failures before calls are suspended
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long calls stay suspended before a probe is allowed, in milliseconds
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_cache_url(),
            key: default_cache_key(),
            capacity: default_capacity(),
            display_count: default_display_count(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl CacheConfig {
    /// Handshake timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-command reply timeout as a `Duration`.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Suspension window as a `Duration`.
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Producer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// How long `flush` waits for delivery reports in milliseconds
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,

    /// librdkafka `message.timeout.ms`
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            flush_timeout_ms: default_flush_timeout_ms(),
            message_timeout_ms: default_message_timeout_ms(),
        }
    }
}

impl ProducerConfig {
    /// Flush timeout as a `Duration`.
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Metrics HTTP port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Health check HTTP port
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Serve the health and metrics endpoints while consuming
    #[serde(default = "default_true")]
    pub http_enabled: bool,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            health_port: default_health_port(),
            http_enabled: true,
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_session_timeout_ms() -> u32 {
    30000
}
fn default_auto_commit_interval_ms() -> u32 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_cache_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_cache_key() -> String {
    "tweets".to_string()
}
fn default_capacity() -> usize {
    100
}
fn default_display_count() -> usize {
    5
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_command_timeout_ms() -> u64 {
    500
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout_ms() -> u64 {
    30000
}
fn default_flush_timeout_ms() -> u64 {
    5000
}
fn default_message_timeout_ms() -> u32 {
    30000
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_health_port() -> u16 {
    8080
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without validating it, so overrides can be
    /// applied first.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render the effective configuration, including defaults, as TOML.
    ///
    /// SASL passwords are masked.
    pub fn to_toml_string(&self) -> crate::Result<String> {
        let mut shown = self.clone();
        if shown.kafka.security.sasl_password.is_some() {
            shown.kafka.security.sasl_password = Some("********".into());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Configuration for a single local broker and store.
    pub fn default_local() -> Self {
        Self {
            kafka: KafkaConfig {
                bootstrap_servers: vec!["localhost:9092".into()],
                topic: "tweets".into(),
                consumer_group: "my-consumer-group".into(),
                poll_timeout_ms: default_poll_timeout_ms(),
                session_timeout_ms: default_session_timeout_ms(),
                auto_commit_interval_ms: default_auto_commit_interval_ms(),
                enable_partition_eof: true,
                auto_offset_reset: OffsetReset::Earliest,
                security: KafkaSecurityConfig::default(),
            },
            cache: CacheConfig::default(),
            producer: ProducerConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.kafka.bootstrap_servers.is_empty()
            || self.kafka.bootstrap_servers.iter().any(|s| s.trim().is_empty())
        {
            return Err(crate::Error::Config(
                "At least one bootstrap server required".into(),
            ));
        }

        if self.kafka.topic.is_empty() {
            return Err(crate::Error::Config("Kafka topic is required".into()));
        }

        if self.kafka.consumer_group.is_empty() {
            return Err(crate::Error::Config("Consumer group is required".into()));
        }

        if self.kafka.poll_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "Poll timeout must be greater than zero".into(),
            ));
        }

        if self.cache.key.is_empty() {
            return Err(crate::Error::Config("Cache key is required".into()));
        }

        if self.cache.capacity == 0 {
            return Err(crate::Error::Config(
                "Cache capacity must be greater than zero".into(),
            ));
        }

        if self.cache.command_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "Cache command timeout must be greater than zero".into(),
            ));
        }

        if self.cache.display_count == 0 {
            return Err(crate::Error::Config(
                "Display count must be greater than zero".into(),
            ));
        }

        if let Err(e) = self.cache.url.as_str().into_connection_info() {
            return Err(crate::Error::Config(format!(
                "Invalid cache url '{}': {}",
                self.cache.url, e
            )));
        }

        if self.cache.display_count > self.cache.capacity {
            tracing::warn!(
                display_count = self.cache.display_count,
                capacity = self.cache.capacity,
                "Display count exceeds window capacity, reads will be capped"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_config() {
        let config = CacheConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.key, "tweets");
        assert_eq!(config.capacity, 100);
        assert_eq!(config.display_count, 5);
    }

    #[test]
    fn test_default_local_is_valid() {
        let config = Config::default_local();
        assert!(config.validate().is_ok());
        assert_eq!(config.kafka.poll_timeout(), Duration::from_millis(1000));
        assert_eq!(config.kafka.auto_offset_reset, OffsetReset::Earliest);
    }

    #[test]
    fn test_config_validation_empty_servers() {
        let mut config = Config::default_local();
        config.kafka.bootstrap_servers = vec![];
        assert!(config.validate().is_err());

        config.kafka.bootstrap_servers = vec!["  ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_cache() {
        let mut config = Config::default_local();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default_local();
        config.cache.display_count = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default_local();
        config.cache.url = "http://localhost:6379".into();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_config_validation_poll_timeout() {
        let mut config = Config::default_local();
        config.kafka.poll_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_command_timeout() {
        let mut config = Config::default_local();
        assert_eq!(config.cache.command_timeout(), Duration::from_millis(500));

        config.cache.command_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [kafka]
            bootstrap_servers = ["broker-1:9092", "broker-2:9092"]
            topic = "tweets"
            consumer_group = "readers"
            auto_offset_reset = "latest"

            [cache]
            capacity = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.kafka.brokers(), "broker-1:9092,broker-2:9092");
        assert_eq!(config.kafka.auto_offset_reset, OffsetReset::Latest);
        assert_eq!(config.kafka.poll_timeout_ms, 1000);
        assert!(config.kafka.enable_partition_eof);
        assert_eq!(config.cache.capacity, 3);
        assert_eq!(config.cache.key, "tweets");
        assert_eq!(config.monitoring.log_format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_offset_reset_from_str() {
        assert_eq!("EARLIEST".parse::<OffsetReset>().unwrap(), OffsetReset::Earliest);
        assert_eq!("latest".parse::<OffsetReset>().unwrap(), OffsetReset::Latest);
        assert!("middle".parse::<OffsetReset>().is_err());
    }

    #[test]
    fn test_default_monitoring_config() {
        let config = MonitoringConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.health_port, 8080);
        assert!(config.http_enabled);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_from_file_validates() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[kafka]\nbootstrap_servers = [\"localhost:9092\"]\ntopic = \"\"\nconsumer_group = \"g\""
        )
        .unwrap();

        // Parsing alone accepts it; validation does not.
        assert!(Config::load(file.path()).is_ok());
        assert!(matches!(
            Config::from_file(file.path()),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_to_toml_string_masks_password() {
        let mut config = Config::default_local();
        config.kafka.security.sasl_password = Some("hunter2".into());

        let rendered = config.to_toml_string().unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("capacity = 100"));

        let parsed = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.kafka.topic, "tweets");
        assert_eq!(parsed.cache.display_count, 5);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::from_toml_str(include_str!("../../../config.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.monitoring.log_format, LogFormat::Text);
        assert_eq!(config.cache.capacity, 100);
    }
}
