//! Recent command implementation.

use super::render_recent;
use anyhow::{Context, Result};
use k2r_core::cache::{CacheHealth, RecentWindow};
use k2r_core::Config;

/// Print up to `count` of the newest records in the window.
pub async fn run(config: Config, count: Option<usize>) -> Result<()> {
    let count = count.unwrap_or(config.cache.display_count);

    let window = RecentWindow::connect(&config.cache)
        .await
        .context("Failed to connect to the recent-window store. Is Redis running?")?;

    let recent = window.recent(count).await;
    println!("{}", render_recent(window.key(), &recent));

    if let CacheHealth::Degraded(reason) = window.health() {
        eprintln!("Cache degraded: {}", reason);
    } else if recent.is_empty() {
        println!("  (empty)");
    }

    Ok(())
}
