//! Fixed-delay retry policy with an injectable sleep.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay between two connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Something that can wait
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Unbounded retries with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or fails with a non-transient error.
    ///
    /// Errors for which `is_transient` holds are logged and retried after the
    /// delay, forever. Any other error is returned as is.
    pub async fn retry<T, E, Op, Fut, P>(
        &self,
        sleeper: &dyn Sleeper,
        mut operation: Op,
        is_transient: P,
    ) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt: u64 = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    warn!(
                        "Attempt {} failed: {}. Retrying in {}s",
                        attempt,
                        e,
                        self.delay.as_secs_f32()
                    );
                    sleeper.sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY)
    }
}
