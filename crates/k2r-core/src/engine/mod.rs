//! Consumer loop orchestration.
//!
//! Ties a stream source to the recent window: poll, classify, store,
//! read back, repeat, until the shutdown token is cancelled.

mod consumer_loop;
mod observer;

pub use consumer_loop::{ConsumerLoop, ConsumerState, LoopSettings, LoopSummary};
pub use observer::{LoopObserver, TracingObserver};
