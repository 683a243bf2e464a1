//! Capacity-bounded, newest-first window of recent records.
//!
//! ## Length bound
//!
//! A write is `push_front` then `trim(0, N-1)`. The pair is not atomic, so
//! between the two commands the list holds one extra element. When a trim
//! fails the window remembers it and the next write re-issues the trim
//! before inserting anything; if that heal fails the insert is skipped.
//! Each writer therefore leaves at most one untrimmed element behind, and
//! with `W` writers sharing a key the length stays within `N + W`.

use super::{ListStore, RedisListStore};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::config::CacheConfig;
use crate::{CacheError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Observable health of the window.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheHealth {
    /// Last store call succeeded and no trim is outstanding
    Healthy,
    /// Writes are skipped or deferred and reads come back empty
    Degraded(String),
}

impl CacheHealth {
    /// True when the window is fully usable.
    pub fn is_healthy(&self) -> bool {
        matches!(self, CacheHealth::Healthy)
    }
}

/// What a single `store` call achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Inserted and trimmed; `length` is the window length afterwards.
    Stored { length: usize },
    /// Inserted, but the trim failed and will be retried on the next write.
    TrimDeferred,
    /// Nothing was written.
    Skipped,
}

/// Recent-window cache over a [`ListStore`].
pub struct RecentWindow<S: ListStore = RedisListStore> {
    store: S,
    key: String,
    capacity: usize,
    breaker: CircuitBreaker,
    trim_pending: AtomicBool,
    health: RwLock<CacheHealth>,
}

impl RecentWindow<RedisListStore> {
    /// Connect to the configured store.
    ///
    /// Unreachable stores and rejected handshakes are fatal here; after
    /// this point store failures only degrade the window.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let store = RedisListStore::connect(config).await?;
        Ok(Self::with_store(store, config))
    }
}

impl<S: ListStore> RecentWindow<S> {
    /// Wrap an already-connected store.
    pub fn with_store(store: S, config: &CacheConfig) -> Self {
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig::new(format!("cache:{}", config.key))
                .with_failure_threshold(config.failure_threshold)
                .with_reset_timeout(config.reset_timeout()),
        );

        Self {
            store,
            key: config.key.clone(),
            capacity: config.capacity.max(1),
            breaker,
            trim_pending: AtomicBool::new(false),
            health: RwLock::new(CacheHealth::Healthy),
        }
    }

    /// Window capacity N.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// List key holding the window.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The underlying store.
    pub fn store_ref(&self) -> &S {
        &self.store
    }

    /// Current health.
    pub fn health(&self) -> CacheHealth {
        self.health.read().clone()
    }

    /// True if a failed trim is waiting to be re-issued.
    pub fn trim_pending(&self) -> bool {
        self.trim_pending.load(Ordering::SeqCst)
    }

    /// Insert `payload` at the front of the window, then trim to capacity.
    ///
    /// Never fails: store errors are absorbed and reflected in [`health`].
    ///
    /// [`health`]: RecentWindow::health
    pub async fn store(&self, payload: &[u8]) -> StoreOutcome {
        if !self.breaker.is_allowed() {
            self.degrade(&CacheError::CircuitOpen);
            return StoreOutcome::Skipped;
        }

        if self.trim_pending.load(Ordering::SeqCst) {
            if let Err(e) = self.trim().await {
                self.fail(&e);
                return StoreOutcome::Skipped;
            }
            self.trim_pending.store(false, Ordering::SeqCst);
            debug!(key = %self.key, "Deferred trim applied");
        }

        let length = match self.store.push_front(&self.key, payload).await {
            Ok(length) => length,
            Err(e) => {
                // The insert may have landed before the reply was lost.
                self.trim_pending.store(true, Ordering::SeqCst);
                self.fail(&e);
                return StoreOutcome::Skipped;
            }
        };

        if let Err(e) = self.trim().await {
            self.trim_pending.store(true, Ordering::SeqCst);
            self.fail(&e);
            return StoreOutcome::TrimDeferred;
        }

        self.succeed();
        StoreOutcome::Stored {
            length: length.min(self.capacity),
        }
    }

    /// Up to `count` most recent payloads, newest first.
    ///
    /// Returns an empty list when `count` is zero, the window is empty, or
    /// the store is unusable.
    pub async fn recent(&self, count: usize) -> Vec<Vec<u8>> {
        if count == 0 {
            return Vec::new();
        }

        if !self.breaker.is_allowed() {
            self.degrade(&CacheError::CircuitOpen);
            return Vec::new();
        }

        let limit = count.min(self.capacity);
        match self.store.range(&self.key, 0, limit as isize - 1).await {
            Ok(mut items) => {
                self.succeed();
                items.truncate(limit);
                items
            }
            Err(e) => {
                self.fail(&e);
                Vec::new()
            }
        }
    }

    async fn trim(&self) -> std::result::Result<(), CacheError> {
        self.store
            .trim(&self.key, 0, self.capacity as isize - 1)
            .await
    }

    fn succeed(&self) {
        self.breaker.record_success();
        if self.trim_pending.load(Ordering::SeqCst) {
            return;
        }

        let mut health = self.health.write();
        if !health.is_healthy() {
            info!(key = %self.key, store = %self.store.describe(), "Cache recovered");
            *health = CacheHealth::Healthy;
        }
    }

    fn fail(&self, err: &CacheError) {
        self.breaker.record_failure();
        self.degrade(err);
    }

    fn degrade(&self, err: &CacheError) {
        let reason = match (err, self.breaker.state()) {
            (CacheError::CircuitOpen, _) => err.to_string(),
            (_, CircuitState::Open) => format!("{} (circuit open)", err),
            _ => err.to_string(),
        };

        let mut health = self.health.write();
        if health.is_healthy() {
            warn!(
                key = %self.key,
                store = %self.store.describe(),
                reason = %reason,
                "Cache degraded, ingestion continues without it"
            );
        } else {
            debug!(key = %self.key, reason = %reason, "Cache still degraded");
        }
        *health = CacheHealth::Degraded(reason);
    }
}
