use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use remedy_core::{
    ImpactEstimate, RemediationRequest, RemediationResult, RollbackDescriptor, RollbackResult,
};

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::executor::{DynFixExecutor, FixExecutor};
use crate::inventory::ResourceSnapshot;

/// Wraps an executor with a per-attempt timeout, capped backoff retries of
/// transient errors and a concurrency limit.
///
/// A timed-out `execute` is retried like any other transient failure, which
/// relies on executors being idempotent.
pub struct RetryingExecutor {
    inner: Arc<dyn DynFixExecutor>,
    config: ExecutorConfig,
    semaphore: Arc<Semaphore>,
}

impl RetryingExecutor {
    /// Wrap `inner` with its own concurrency limit.
    pub fn new(inner: Arc<dyn DynFixExecutor>, config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self::with_semaphore(inner, config, semaphore)
    }

    /// Wrap `inner`, sharing `semaphore` with other executors.
    pub fn with_semaphore(
        inner: Arc<dyn DynFixExecutor>,
        config: ExecutorConfig,
        semaphore: Arc<Semaphore>,
    ) -> Self {
        Self {
            inner,
            config,
            semaphore,
        }
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ExecutorError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ExecutorError>> + Send,
        T: Send,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ExecutorError::ExecutionFailed("executor pool is closed".into()))?;

        let mut attempt = 0u32;
        loop {
            debug!(
                executor = self.inner.kind(),
                operation,
                attempt,
                "invoking executor"
            );
            let outcome = match tokio::time::timeout(self.config.execution_timeout, call()).await
            {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(ExecutorError::Timeout(self.config.execution_timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_strategy.delay_for(attempt);
                    warn!(
                        executor = self.inner.kind(),
                        operation,
                        attempt,
                        error = %err,
                        delay_ms = %delay.as_millis(),
                        "transient executor error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        executor = self.inner.kind(),
                        operation,
                        attempt,
                        error = %err,
                        retryable = err.is_retryable(),
                        "executor call failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}

impl FixExecutor for RetryingExecutor {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn resource_type(&self) -> &str {
        self.inner.resource_type()
    }

    fn remediation_type(&self) -> &str {
        self.inner.remediation_type()
    }

    async fn estimate_impact(
        &self,
        request: &RemediationRequest,
        snapshot: &ResourceSnapshot,
    ) -> Result<ImpactEstimate, ExecutorError> {
        self.run("estimate_impact", || {
            self.inner.estimate_impact(request, snapshot)
        })
        .await
    }

    async fn execute(
        &self,
        request: &RemediationRequest,
    ) -> Result<RemediationResult, ExecutorError> {
        self.run("execute", || self.inner.execute(request)).await
    }

    async fn rollback(
        &self,
        request: &RemediationRequest,
        descriptor: &RollbackDescriptor,
    ) -> Result<RollbackResult, ExecutorError> {
        self.run("rollback", || self.inner.rollback(request, descriptor))
            .await
    }
}
