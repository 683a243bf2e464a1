//! Consume command implementation.

use super::{render_recent, StoreKind};
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use k2r_core::cache::{ListStore, MemoryListStore, RecentWindow};
use k2r_core::engine::{ConsumerLoop, LoopObserver, LoopSettings};
use k2r_core::health::HealthCheck;
use k2r_core::kafka::{KafkaConsumerBuilder, Record};
use k2r_core::metrics::PipelineMetrics;
use k2r_core::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Prints each cycle to the console.
struct ConsoleObserver {
    key: String,
}

impl LoopObserver for ConsoleObserver {
    fn on_record(&mut self, record: &Record, recent: &[Vec<u8>]) {
        println!("Received: {}", record.payload_str());
        println!("{}", render_recent(&self.key, recent));
    }

    fn on_partition_end(&mut self, _partition: i32) {
        println!("Reached end of partition");
    }

    fn on_poll_error(&mut self, detail: &str) {
        eprintln!("Consumer error: {}", detail);
    }

    fn on_shutdown(&mut self) {
        println!("Closing consumer...");
    }
}

/// Run the consumer loop until SIGINT or SIGTERM.
pub async fn run(config: Config, store: StoreKind) -> Result<()> {
    info!(
        topic = %config.kafka.topic,
        group = %config.kafka.consumer_group,
        store = ?store,
        "Starting consumer"
    );

    // The window is connected before the broker client, so an unreachable
    // store fails fast.
    match store {
        StoreKind::Redis => {
            let window = RecentWindow::connect(&config.cache)
                .await
                .context("Failed to connect to the recent-window store. Is Redis running?")?;
            consume(config, Arc::new(window)).await
        }
        StoreKind::Memory => {
            let window = RecentWindow::with_store(MemoryListStore::new(), &config.cache);
            consume(config, Arc::new(window)).await
        }
    }
}

async fn consume<L: ListStore + 'static>(
    config: Config,
    window: Arc<RecentWindow<L>>,
) -> Result<()> {
    let source = KafkaConsumerBuilder::new(config.kafka.clone()).build()?;

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(PipelineMetrics::new()?);
    let health = Arc::new(HealthCheck::for_pipeline());

    let server = if config.monitoring.http_enabled {
        let state = Arc::new(ServerState {
            health: Arc::clone(&health),
            metrics: Arc::clone(&metrics),
            window: Arc::clone(&window),
            display_count: config.cache.display_count,
        });
        Some(tokio::spawn(start_server(
            state,
            config.monitoring.health_port,
            config.monitoring.metrics_port,
            shutdown.clone(),
        )))
    } else {
        None
    };

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let mut consumer = ConsumerLoop::new(source, window, LoopSettings::from_config(&config))?
        .with_shutdown(shutdown.clone())
        .with_metrics(metrics)
        .with_health(health)
        .with_observer(ConsoleObserver {
            key: config.cache.key.clone(),
        });

    let result = consumer.run().await;

    // Stops the HTTP servers when the loop ended on its own.
    shutdown.cancel();
    if let Some(server) = server {
        if let Err(e) = server.await {
            warn!(error = %e, "HTTP server task failed");
        }
    }

    let summary = result?;
    info!(
        records = summary.records,
        errors = summary.errors,
        "Consumer stopped"
    );
    println!("Done!");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = shutdown.cancelled() => return,
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, only Ctrl+C will stop the consumer");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    }
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = shutdown.cancelled() => return,
        }
    }

    println!("\nStopping consumer...");
    shutdown.cancel();
}
