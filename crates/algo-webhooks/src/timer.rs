//! Clock and backoff timer abstraction.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current time and of backoff waits.
#[async_trait::async_trait]
pub trait Timer: Send + Sync {
    /// Suspend the current delivery for `duration` without blocking a thread.
    async fn sleep(&self, duration: Duration);

    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock timer backed by `tokio::time`.
///
/// Honors tokio's paused clock, so tests can use `start_paused = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait::async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
