use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Linear backoff retry policy for fallible async operations.
///
/// An operation gets `max_retries` additional attempts after the first one.
/// Before retry number `n` (1-based) the policy sleeps `base_delay_ms * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// Delay before the given retry attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    /// Run `operation` until it succeeds or the retries are used up.
    ///
    /// The error of the final attempt is returned as-is.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut remaining = self.max_retries;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(_) if remaining > 0 => {
                    let attempt = self.max_retries - remaining + 1;
                    tokio::time::sleep(self.delay_for_attempt(attempt)).await;
                    remaining -= 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
