//! Remote list store boundary.

use crate::CacheError;
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for single store commands.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Request/response commands over named lists.
///
/// Indices follow list-store conventions: `0` is the head, negative
/// indices count from the tail, and `stop` is inclusive. Each command is
/// atomic on its own; no command pair is.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Insert `value` at the head of `key`, returning the new length.
    async fn push_front(&self, key: &str, value: &[u8]) -> CacheResult<usize>;

    /// Keep only the elements of `key` within `start..=stop`.
    async fn trim(&self, key: &str, start: isize, stop: isize) -> CacheResult<()>;

    /// Read the elements of `key` within `start..=stop`.
    async fn range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<Vec<u8>>>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Lets several windows share one store handle.
#[async_trait]
impl<T: ListStore + ?Sized> ListStore for Arc<T> {
    async fn push_front(&self, key: &str, value: &[u8]) -> CacheResult<usize> {
        (**self).push_front(key, value).await
    }

    async fn trim(&self, key: &str, start: isize, stop: isize) -> CacheResult<()> {
        (**self).trim(key, start, stop).await
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<Vec<u8>>> {
        (**self).range(key, start, stop).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
