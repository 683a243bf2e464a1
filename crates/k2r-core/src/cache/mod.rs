//! Recent-window cache over a remote ordered-list store.
//!
//! The window is newest-first and capped at a fixed capacity. Writes are an
//! insert-front followed by a trim, issued as two independent idempotent
//! commands; reads are a bounded range. Store failures never propagate out
//! of the window: they degrade it, and the degradation is visible through
//! [`RecentWindow::health`].

mod memory_store;
mod redis_store;
mod store;
mod window;

pub use memory_store::MemoryListStore;
pub use redis_store::RedisListStore;
pub use store::{CacheResult, ListStore};
pub use window::{CacheHealth, RecentWindow, StoreOutcome};
