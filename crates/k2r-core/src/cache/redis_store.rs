//! Redis-backed list store.

use super::{CacheResult, ListStore};
use crate::config::CacheConfig;
use crate::CacheError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// List store speaking to Redis through a reconnecting connection manager.
///
/// The manager is cheap to clone and multiplexes commands, so each call
/// works on its own handle. Every command is bounded by the configured
/// reply timeout; a server that stops answering fails the command instead
/// of stalling the caller.
#[derive(Clone)]
pub struct RedisListStore {
    conn: ConnectionManager,
    url: String,
    command_timeout: Duration,
}

impl RedisListStore {
    /// Connect to `config.url` and verify that `config.key` is usable as a list.
    ///
    /// Fails with [`CacheError::ConnectionFailed`] when the server is
    /// unreachable within the connect timeout or rejects the handshake.
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let url = config.url.as_str();
        let key = config.key.as_str();
        let timeout = config.connect_timeout();
        let client = redis::Client::open(url).map_err(|e| CacheError::InvalidUrl(e.to_string()))?;

        let connection_failed = |message: String| CacheError::ConnectionFailed {
            url: url.to_string(),
            message,
        };

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| connection_failed(format!("timed out after {}ms", timeout.as_millis())))?
            .map_err(|e| connection_failed(e.to_string()))?;

        // LLEN doubles as the handshake: it fails on a non-list key.
        let mut probe = conn.clone();
        let length: usize = tokio::time::timeout(timeout, probe.llen(key))
            .await
            .map_err(|_| connection_failed("handshake timed out".to_string()))?
            .map_err(|e| connection_failed(e.to_string()))?;

        info!(url = %url, key = %key, length, "Connected to list store");

        Ok(Self {
            conn,
            url: url.to_string(),
            command_timeout: config.command_timeout(),
        })
    }

    async fn bounded<T>(
        &self,
        command: &'static str,
        reply: impl Future<Output = RedisResult<T>>,
    ) -> CacheResult<T> {
        tokio::time::timeout(self.command_timeout, reply)
            .await
            .map_err(|_| {
                CacheError::command(
                    command,
                    format!("no reply within {}ms", self.command_timeout.as_millis()),
                )
            })?
            .map_err(|e| CacheError::command(command, e))
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn push_front(&self, key: &str, value: &[u8]) -> CacheResult<usize> {
        let mut conn = self.conn.clone();
        let length: usize = self.bounded("LPUSH", conn.lpush(key, value)).await?;
        debug!(key = %key, length, "LPUSH");
        Ok(length)
    }

    async fn trim(&self, key: &str, start: isize, stop: isize) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("LTRIM", conn.ltrim::<_, ()>(key, start, stop))
            .await
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<Vec<u8>>> {
        let mut conn = self.conn.clone();
        self.bounded("LRANGE", conn.lrange(key, start, stop)).await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
