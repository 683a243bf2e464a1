//! K2R CLI - Kafka to Redis recent-window tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{CacheArgs, KafkaArgs, StoreKind};
use k2r_core::config::LogFormat;
use k2r_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, bad override)
    ConfigError = 1,
    /// Kafka-related error (client creation, subscription, produce)
    KafkaError = 2,
    /// Remote list store unreachable or rejected the handshake
    CacheError = 3,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Map an error to an exit code by finding the core error in its chain.
    fn from_error(error: &anyhow::Error) -> Self {
        let core = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<k2r_core::Error>());

        match core {
            Some(k2r_core::Error::Config(_)) => ExitCode::ConfigError,
            Some(k2r_core::Error::Kafka(_)) => ExitCode::KafkaError,
            Some(k2r_core::Error::Cache(_)) => ExitCode::CacheError,
            Some(_) | None => ExitCode::RuntimeError,
        }
    }
}

mod commands;
mod server;

#[derive(Parser)]
#[command(name = "k2r")]
#[command(about = "Kafka to Redis recent-window CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults to ./config.toml when present)
    #[arg(short, long, global = true, env = "K2R_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume records into the recent window until interrupted
    Consume {
        #[command(flatten)]
        kafka: KafkaArgs,

        #[command(flatten)]
        cache: CacheArgs,

        /// Window backend; `memory` runs without a Redis server
        #[arg(long, value_enum, default_value_t = StoreKind::Redis, env = "K2R_STORE")]
        store: StoreKind,

        /// Do not serve the health and metrics endpoints
        #[arg(long)]
        no_http: bool,
    },

    /// Produce messages to the topic and wait for delivery
    Produce {
        /// Message payloads (one record each)
        messages: Vec<String>,

        /// Optional record key
        #[arg(long)]
        key: Option<String>,

        #[command(flatten)]
        kafka: KafkaArgs,
    },

    /// Print the most recent records held in the window
    Recent {
        /// Number of records to show (defaults to cache.display_count)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Show status and health
    Status {
        /// Health endpoint URL
        #[arg(long, default_value = "http://localhost:8080", env = "K2R_STATUS_URL")]
        url: String,

        /// Metrics endpoint URL
        #[arg(long, default_value = "http://localhost:9090")]
        metrics_url: String,
    },

    /// Validate configuration file
    Validate {
        /// Print the effective configuration, defaults included
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Config is optional at this point; logging falls back to JSON at info.
    let monitoring = cli
        .config
        .as_ref()
        .and_then(|path| Config::load(path).ok())
        .map(|config| config.monitoring);
    let log_format = monitoring
        .as_ref()
        .map(|m| m.log_format)
        .unwrap_or(LogFormat::Json);
    let log_level = monitoring
        .as_ref()
        .map(|m| m.log_level.as_str())
        .unwrap_or("info");

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(log_level),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Console output goes to stdout, so logs go to stderr.
    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    let result = execute_command(cli).await;

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Consume {
            kafka,
            cache,
            store,
            no_http,
        } => {
            let mut config = load_config(&cli.config)?;
            kafka.apply(&mut config);
            cache.apply(&mut config);
            if no_http {
                config.monitoring.http_enabled = false;
            }
            config.validate()?;
            commands::consume::run(config, store).await?;
        }

        Commands::Produce {
            messages,
            key,
            kafka,
        } => {
            let mut config = load_config(&cli.config)?;
            kafka.apply(&mut config);
            config.validate()?;
            commands::produce::run(config, messages, key).await?;
        }

        Commands::Recent { count, cache } => {
            let mut config = load_config(&cli.config)?;
            cache.apply(&mut config);
            config.validate()?;
            commands::recent::run(config, count).await?;
        }

        Commands::Status { url, metrics_url } => {
            commands::status::run(&url, &metrics_url).await?;
        }

        Commands::Validate { show } => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Configuration is valid");
            println!(
                "  kafka: {} (topic {}, group {})",
                config.kafka.brokers(),
                config.kafka.topic,
                config.kafka.consumer_group
            );
            println!(
                "  cache: {} (key {}, capacity {})",
                config.cache.url, config.cache.key, config.cache.capacity
            );
            if show {
                println!("\n{}", config.to_toml_string()?);
            }
        }
    }

    Ok(())
}

/// Load the configuration file, or the local defaults when no file is
/// given and `config.toml` does not exist.
fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => {
            let default_path = PathBuf::from("config.toml");
            if default_path.exists() {
                Ok(Config::load(&default_path)?)
            } else {
                tracing::debug!("No config.toml found, using local defaults");
                Ok(Config::default_local())
            }
        }
    }
}
