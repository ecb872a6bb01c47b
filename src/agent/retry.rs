//! Bounded retry policy for rate-limited model calls.

use async_trait::async_trait;
use std::time::Duration;

/// Linear backoff: retry `n` (0-based) waits `(n + 1) * backoff_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first rate-limited call.
    pub max_retries: usize,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_step: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, retry: usize) -> Duration {
        self.backoff_step * (retry as u32 + 1)
    }

    /// Full wait schedule, e.g. `[30s, 60s]` for the default policy.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|n| self.backoff(n)).collect()
    }
}

/// Source of delays, swappable so tests never wait on the wall clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
