use std::time::Duration;

use crate::retry::RetryStrategy;

/// Retry, timeout and concurrency limits applied around every executor call
/// by [`RetryingExecutor`](crate::RetryingExecutor).
///
/// # Examples
///
/// ```
/// use remedy_executor::ExecutorConfig;
///
/// let config = ExecutorConfig::default();
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retries after the first attempt for retryable errors.
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    /// Wall-clock limit for one attempt.
    pub execution_timeout: Duration,
    /// Cloud calls allowed in flight at once across all executors.
    pub max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_strategy: RetryStrategy::default(),
            execution_timeout: Duration::from_secs(30),
            max_concurrent: 16,
        }
    }
}
