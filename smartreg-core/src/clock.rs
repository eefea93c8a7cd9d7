//! Injectable time source.

use std::time::Duration;

use async_trait::async_trait;

/// Source of delays for the registration poll.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
