// Bounded retry with fixed backoff

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry budget shared by downloads, service polling and health checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Execute an operation until it succeeds or the budget is spent.
    /// Returns the last error on exhaustion.
    pub async fn run<F, T, Fut>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!("Operation '{}' succeeded on attempt {}", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    tracing::warn!(
                        "Operation '{}' failed on attempt {}/{}: {:#}",
                        operation_name,
                        attempt,
                        attempts,
                        error
                    );
                    last_error = Some(error);

                    if attempt < attempts {
                        tracing::debug!("Retrying in {:?}...", self.delay);
                        sleep(self.delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("'{}' made no attempts", operation_name)))
    }

    /// Poll a probe until it reports true. Probe errors count as "not yet".
    pub async fn poll_until<F, Fut>(&self, operation_name: &str, probe: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        self.run(operation_name, |_| {
            let check = probe();
            async move {
                match check.await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(anyhow::anyhow!("condition not met yet")),
                    Err(e) => Err(e),
                }
            }
        })
        .await
        .is_ok()
    }
}
