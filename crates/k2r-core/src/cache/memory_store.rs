//! In-process list store.
//!
//! Mirrors the list-store index conventions and supports fault injection,
//! so the window and the consumer loop can be exercised without a server.
//! The CLI uses it for dry runs.

use super::{CacheResult, ListStore};
use crate::CacheError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// In-memory list store.
#[derive(Default)]
pub struct MemoryListStore {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    unavailable: AtomicBool,
    failing_pushes: AtomicU32,
    failing_trims: AtomicU32,
    failing_ranges: AtomicU32,
    commands: AtomicU64,
}

impl MemoryListStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every command fails until restored.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Fail the next `n` push commands.
    pub fn fail_next_pushes(&self, n: u32) {
        self.failing_pushes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` trim commands.
    pub fn fail_next_trims(&self, n: u32) {
        self.failing_trims.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` range commands.
    pub fn fail_next_ranges(&self, n: u32) {
        self.failing_ranges.store(n, Ordering::SeqCst);
    }

    /// Number of commands received, including failed ones.
    pub fn commands_issued(&self) -> u64 {
        self.commands.load(Ordering::SeqCst)
    }

    /// Current length of `key`.
    pub fn len(&self, key: &str) -> usize {
        self.lists.lock().get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// True if `key` holds no elements.
    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Full contents of `key`, head first.
    pub fn snapshot(&self, key: &str) -> Vec<Vec<u8>> {
        self.lists
            .lock()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self, command: &'static str, failing: &AtomicU32) -> CacheResult<()> {
        self.commands.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::command(command, "connection refused"));
        }

        let injected = failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CacheError::command(command, "injected failure"));
        }

        Ok(())
    }
}

/// Resolve inclusive, possibly negative, list indices against `len`.
///
/// Returns the half-open range to keep, or `None` when it is empty.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push_front(&self, key: &str, value: &[u8]) -> CacheResult<usize> {
        self.check("LPUSH", &self.failing_pushes)?;
        let mut lists = self.lists.lock();
        let list = lists.entry(key.to_string()).or_default();
        list.push_front(value.to_vec());
        Ok(list.len())
    }

    async fn trim(&self, key: &str, start: isize, stop: isize) -> CacheResult<()> {
        self.check("LTRIM", &self.failing_trims)?;
        let mut lists = self.lists.lock();
        let Some(list) = lists.get_mut(key) else {
            return Ok(());
        };

        match resolve_range(list.len(), start, stop) {
            Some((from, to)) => {
                list.truncate(to);
                list.drain(..from);
            }
            None => list.clear(),
        }
        if list.is_empty() {
            lists.remove(key);
        }
        Ok(())
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<Vec<u8>>> {
        self.check("LRANGE", &self.failing_ranges)?;
        let lists = self.lists.lock();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };

        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..to).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
