//! Stream source boundary.

use super::PollOutcome;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// An ordered, partitioned record stream with bounded-wait polling.
///
/// Offset commits are the implementation's business; callers never track
/// offsets themselves.
#[async_trait]
pub trait StreamSource: Send {
    /// Subscribe to the given topics.
    fn subscribe(&mut self, topics: &[String]) -> Result<()>;

    /// Wait at most `timeout` for the next record or signal.
    async fn poll(&mut self, timeout: Duration) -> PollOutcome;

    /// Release the subscription. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}
