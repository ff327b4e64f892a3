use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::ExecutorConfig;
use crate::executor::DynFixExecutor;
use crate::retrying::RetryingExecutor;

/// Lookup table from `(resource_type, remediation_type)` to the executor
/// that handles it.
///
/// Built once at startup and then shared immutably (typically inside an
/// `Arc`). When created with [`with_config`](Self::with_config), every
/// registered executor is wrapped in a [`RetryingExecutor`] sharing one
/// concurrency limit.
pub struct ExecutorRegistry {
    executors: HashMap<(String, String), Arc<dyn DynFixExecutor>>,
    retry: Option<(ExecutorConfig, Arc<Semaphore>)>,
}

impl ExecutorRegistry {
    /// Create an empty registry that stores executors unwrapped.
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            retry: None,
        }
    }

    /// Create an empty registry that wraps executors with retries, timeouts
    /// and a shared concurrency limit.
    pub fn with_config(config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            executors: HashMap::new(),
            retry: Some((config, semaphore)),
        }
    }

    /// Register an executor under its own resource and remediation type.
    ///
    /// An executor already registered for the same pair is replaced.
    pub fn register(&mut self, executor: Arc<dyn DynFixExecutor>) {
        let key = (
            executor.resource_type().to_owned(),
            executor.remediation_type().to_owned(),
        );
        let executor: Arc<dyn DynFixExecutor> = match &self.retry {
            Some((config, semaphore)) => Arc::new(RetryingExecutor::with_semaphore(
                executor,
                config.clone(),
                Arc::clone(semaphore),
            )),
            None => executor,
        };
        self.executors.insert(key, executor);
    }

    /// Look up the executor for a resource/remediation pair.
    pub fn get(
        &self,
        resource_type: &str,
        remediation_type: &str,
    ) -> Option<Arc<dyn DynFixExecutor>> {
        self.executors
            .get(&(resource_type.to_owned(), remediation_type.to_owned()))
            .cloned()
    }

    /// Whether an executor is registered for the pair.
    pub fn contains(&self, resource_type: &str, remediation_type: &str) -> bool {
        self.get(resource_type, remediation_type).is_some()
    }

    /// Sorted `(resource_type, remediation_type)` pairs.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .executors
            .keys()
            .map(|(r, t)| (r.as_str(), t.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.list())
            .field("retrying", &self.retry.is_some())
            .finish()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unnecessary_literal_bound)]
mod tests {
    use remedy_core::{
        ImpactEstimate, RemediationRequest, RemediationResult, RollbackDescriptor,
        RollbackResult,
    };

    use super::*;
    use crate::error::ExecutorError;
    use crate::executor::FixExecutor;
    use crate::inventory::ResourceSnapshot;

    struct StubExecutor {
        resource_type: &'static str,
        remediation_type: &'static str,
    }

    impl FixExecutor for StubExecutor {
        fn kind(&self) -> &str {
            "stub"
        }

        fn resource_type(&self) -> &str {
            self.resource_type
        }

        fn remediation_type(&self) -> &str {
            self.remediation_type
        }

        async fn estimate_impact(
            &self,
            _request: &RemediationRequest,
            _snapshot: &ResourceSnapshot,
        ) -> Result<ImpactEstimate, ExecutorError> {
            Ok(ImpactEstimate::default())
        }

        async fn execute(
            &self,
            _request: &RemediationRequest,
        ) -> Result<RemediationResult, ExecutorError> {
            Ok(RemediationResult::default())
        }

        async fn rollback(
            &self,
            _request: &RemediationRequest,
            _descriptor: &RollbackDescriptor,
        ) -> Result<RollbackResult, ExecutorError> {
            Ok(RollbackResult::default())
        }
    }

    fn stub(resource_type: &'static str, remediation_type: &'static str) -> Arc<StubExecutor> {
        Arc::new(StubExecutor {
            resource_type,
            remediation_type,
        })
    }

    #[test]
    fn empty_registry() {
        let reg = ExecutorRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.list().is_empty());
    }

    #[test]
    fn lookup_is_keyed_by_both_types() {
        let mut reg = ExecutorRegistry::new();
        reg.register(stub("S3_BUCKET", "ENABLE_BUCKET_ENCRYPTION"));
        reg.register(stub("S3_BUCKET", "BLOCK_PUBLIC_ACCESS"));

        assert_eq!(reg.len(), 2);
        assert!(reg.contains("S3_BUCKET", "BLOCK_PUBLIC_ACCESS"));
        assert!(!reg.contains("IAM_ROLE", "BLOCK_PUBLIC_ACCESS"));
        assert!(reg.get("S3_BUCKET", "ROTATE_KEYS").is_none());
    }

    #[test]
    fn list_sorted() {
        let mut reg = ExecutorRegistry::new();
        reg.register(stub("S3_BUCKET", "B"));
        reg.register(stub("IAM_ROLE", "A"));
        reg.register(stub("S3_BUCKET", "A"));
        assert_eq!(
            reg.list(),
            vec![("IAM_ROLE", "A"), ("S3_BUCKET", "A"), ("S3_BUCKET", "B")]
        );
    }

    #[test]
    fn register_replaces_existing() {
        let mut reg = ExecutorRegistry::new();
        reg.register(stub("S3_BUCKET", "A"));
        reg.register(stub("S3_BUCKET", "A"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn wrapped_executor_keeps_identity() {
        let mut reg = ExecutorRegistry::with_config(ExecutorConfig::default());
        reg.register(stub("S3_BUCKET", "A"));
        let executor = reg.get("S3_BUCKET", "A").unwrap();
        assert_eq!(executor.kind(), "stub");
        assert_eq!(executor.resource_type(), "S3_BUCKET");
    }

    #[test]
    fn debug_lists_registered_pairs() {
        let mut reg = ExecutorRegistry::with_config(ExecutorConfig::default());
        reg.register(stub("S3_BUCKET", "A"));
        let rendered = format!("{reg:?}");
        assert!(rendered.contains("S3_BUCKET"));
        assert!(rendered.contains("retrying: true"));
    }
}
