use std::sync::Arc;

use tracing::{info, warn};

use remedy_core::{JobStatus, RemediationJob, RollbackResult};
use remedy_executor::{ExecutorError, ExecutorRegistry};

use crate::error::EngineError;

/// Reverts an applied job using the descriptor its executor recorded.
///
/// The manager only talks to executors; persisting the outcome is the
/// orchestrator's job.
#[derive(Debug, Clone)]
pub struct RollbackManager {
    registry: Arc<ExecutorRegistry>,
}

impl RollbackManager {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }

    /// Whether `job` can be rolled back at all.
    pub fn check_eligible(job: &RemediationJob) -> Result<(), EngineError> {
        let unavailable = |reason: &str| EngineError::NoRollbackAvailable {
            job_id: job.id.clone(),
            reason: reason.to_owned(),
        };
        if job.status != JobStatus::Applied {
            return Err(unavailable(&format!("job is {}", job.status)));
        }
        match &job.result {
            Some(result) if result.is_reversible() => Ok(()),
            Some(result) if result.dry_run => Err(unavailable("dry runs change nothing")),
            _ => Err(unavailable("no rollback descriptor was recorded")),
        }
    }

    /// Ask the job's executor to restore the recorded before-state.
    ///
    /// Returns the executor's [`RollbackResult`] as data, whether full,
    /// partial or empty. Fails with `NoRollbackAvailable` when the job is not
    /// eligible or the descriptor belongs to another executor.
    pub async fn rollback(&self, job: &RemediationJob) -> Result<RollbackResult, EngineError> {
        Self::check_eligible(job)?;
        let descriptor = job
            .result
            .as_ref()
            .and_then(|r| r.rollback.as_ref())
            .ok_or_else(|| EngineError::NoRollbackAvailable {
                job_id: job.id.clone(),
                reason: "no rollback descriptor was recorded".into(),
            })?;

        let request = &job.request;
        let executor = self
            .registry
            .get(&request.resource_type, &request.remediation_type)
            .ok_or_else(|| EngineError::NoRollbackAvailable {
                job_id: job.id.clone(),
                reason: format!(
                    "no executor registered for {}/{}",
                    request.resource_type, request.remediation_type
                ),
            })?;

        match executor.rollback(request, descriptor).await {
            Ok(result) => {
                info!(
                    job.id = %job.id,
                    success = result.success,
                    partial = result.partial_rollback,
                    restored = result.restored.len(),
                    failed = result.failed.len(),
                    "rollback finished"
                );
                Ok(result)
            }
            Err(ExecutorError::DescriptorMismatch { expected, found }) => {
                Err(EngineError::NoRollbackAvailable {
                    job_id: job.id.clone(),
                    reason: format!("descriptor from {found} cannot be handled by {expected}"),
                })
            }
            Err(e) => {
                warn!(job.id = %job.id, error = %e, "rollback executor failed");
                Ok(RollbackResult {
                    success: false,
                    partial_rollback: false,
                    message: e.to_string(),
                    restored: Vec::new(),
                    failed: descriptor.instructions.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use remedy_core::{RemediationRequest, RemediationResult, RollbackDescriptor};
    use remedy_executor::{MemoryInventory, ResourceInventory, register_builtin};

    use super::*;

    fn manager() -> RollbackManager {
        let inventory: Arc<dyn ResourceInventory> = Arc::new(MemoryInventory::new());
        let mut registry = ExecutorRegistry::new();
        register_builtin(&mut registry, &inventory);
        RollbackManager::new(Arc::new(registry))
    }

    fn applied_job(result: RemediationResult) -> RemediationJob {
        let mut job = RemediationJob::new(RemediationRequest::new(
            "finding-1",
            "ENABLE_BUCKET_ENCRYPTION",
            "bucket-a",
            "S3_BUCKET",
            "acme",
        ));
        job.status = JobStatus::Applied;
        job.result = Some(result);
        job
    }

    fn descriptor(kind: &str) -> RollbackDescriptor {
        RollbackDescriptor {
            executor_kind: kind.into(),
            before_state: serde_json::json!({}),
            instructions: vec!["remove encryption".into()],
        }
    }

    #[tokio::test]
    async fn job_without_descriptor_is_not_eligible() {
        let job = applied_job(RemediationResult {
            success: true,
            message: "already compliant".into(),
            ..RemediationResult::default()
        });
        assert!(matches!(
            manager().rollback(&job).await,
            Err(EngineError::NoRollbackAvailable { .. })
        ));
    }

    #[test]
    fn only_applied_jobs_are_eligible() {
        let mut job = applied_job(RemediationResult {
            success: true,
            rollback: Some(descriptor("s3.bucket_encryption")),
            ..RemediationResult::default()
        });
        job.status = JobStatus::RolledBack;
        let err = RollbackManager::check_eligible(&job).unwrap_err();
        assert!(err.to_string().contains("ROLLED_BACK"));
    }

    #[tokio::test]
    async fn foreign_descriptor_is_rejected() {
        let job = applied_job(RemediationResult {
            success: true,
            rollback: Some(descriptor("iam.detach_admin_policy")),
            ..RemediationResult::default()
        });
        assert!(matches!(
            manager().rollback(&job).await,
            Err(EngineError::NoRollbackAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn executor_error_is_reported_as_failed_result() {
        // The bucket does not exist in the inventory, so restoring fails.
        let job = applied_job(RemediationResult {
            success: true,
            rollback: Some(RollbackDescriptor {
                executor_kind: "s3.bucket_encryption".into(),
                before_state: serde_json::json!({ "previous": null }),
                instructions: vec!["remove encryption".into()],
            }),
            ..RemediationResult::default()
        });
        let result = manager().rollback(&job).await.unwrap();
        assert!(!result.success);
        assert!(!result.partial_rollback);
    }
}
