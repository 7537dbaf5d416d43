use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Backoff policy for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total tries allowed, the first attempt included.
    pub max_attempts: u32,
    /// Pause before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling the growing pause never exceeds.
    pub max_delay: Duration,
    /// Growth factor applied to the pause after each failure.
    pub backoff_multiplier: f64,
    /// Random fraction of the pause (0.0 to 1.0) added on top, spreading
    /// out contending retriers.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::storage()
    }
}

impl RetryConfig {
    /// Profile for store and cache operations: 1 s base, 60 s cap, 3 attempts.
    pub fn storage() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Profile for lock acquisition: 3 attempts, fixed 200 ms between tries.
    pub fn lock_acquire() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Runs an operation until it succeeds, hits a non-retryable error, or
/// exhausts the attempt budget.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation, retrying transient failures.
    ///
    /// Non-transient errors fail immediately; see [`is_transient_error`].
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, operation: F) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        self.execute_with_condition(operation_name, operation, is_transient_error)
            .await
    }

    /// Execute an operation with a custom retry condition.
    pub async fn execute_with_condition<T, F, Fut, R>(
        &self,
        operation_name: &str,
        operation: F,
        retry_condition: R,
    ) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
        R: Fn(&anyhow::Error) -> bool,
    {
        let mut attempt = 1;
        let mut delay = self.config.initial_delay;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "recovered on retry");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if attempt >= self.config.max_attempts {
                        error!(
                            operation = operation_name,
                            attempt,
                            error = ?err,
                            "giving up, attempt budget exhausted"
                        );
                        return Err(err);
                    }

                    if !retry_condition(&err) {
                        debug!(
                            operation = operation_name,
                            error = ?err,
                            "error is not retryable, surfacing it"
                        );
                        return Err(err);
                    }

                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = ?err,
                        delay_ms = delay.as_millis(),
                        "transient failure, backing off"
                    );

                    sleep(delay).await;

                    let grown = Duration::from_millis(
                        (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64,
                    );
                    delay = grown.min(self.config.max_delay);

                    if self.config.jitter_factor > 0.0 {
                        let jitter_cap =
                            (delay.as_millis() as f64 * self.config.jitter_factor) as u64;
                        delay += Duration::from_millis(fastrand::u64(0..=jitter_cap));
                    }

                    attempt += 1;
                }
            }
        }
    }
}

/// Whether an error looks like a transient store/network failure worth
/// retrying: timeouts, dropped connections, write-concern waits.
pub fn is_transient_error(error: &anyhow::Error) -> bool {
    let error_str = format!("{error:#}").to_lowercase();

    error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("connection reset")
        || error_str.contains("connection refused")
        || error_str.contains("broken pipe")
        || error_str.contains("server selection")
        || error_str.contains("write concern")
        || error_str.contains("io error")
}

/// Convenience wrapper for store-class operations.
pub async fn retry_storage_operation<T, F, Fut>(
    operation_name: &str,
    operation: F,
) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    RetryExecutor::new(RetryConfig::storage())
        .execute(operation_name, operation)
        .await
}
