use remedy_audit::AuditError;
use remedy_core::{JobId, JobStatus, RemediationJob, RollbackResult, ValidationError};
use remedy_executor::ExecutorError;
use remedy_state::StateError;

use crate::policy::PolicyError;

/// Errors returned by the remediation engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request is malformed; no job was created.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No job with this id exists for the caller's tenant.
    #[error("remediation job not found: {0}")]
    NotFound(JobId),

    /// The operation is not valid for the job's current status.
    #[error("cannot {operation} job {job_id} in status {from}")]
    InvalidStateTransition {
        job_id: JobId,
        from: JobStatus,
        operation: &'static str,
    },

    /// Another job already holds the active slot for this resource key.
    #[error("active remediation already exists for {resource_key}")]
    Conflict {
        resource_key: String,
        active_job: Option<JobId>,
    },

    /// The executor for an approved job could not be resolved.
    #[error("execution failure: {0}")]
    ExecutionFailure(String),

    /// The job has nothing that can be rolled back.
    #[error("no rollback available for job {job_id}: {reason}")]
    NoRollbackAvailable { job_id: JobId, reason: String },

    /// Some changes were restored and some were not. The job stays `APPLIED`.
    #[error("partial rollback of job {}: {}", job.id, result.message)]
    PartialRollbackFailure {
        job: Box<RemediationJob>,
        result: RollbackResult,
    },

    /// The rollback executor failed before restoring anything.
    #[error("rollback of job {job_id} failed: {message}")]
    RollbackFailed { job_id: JobId, message: String },

    /// A state backend error.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// An audit backend error.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// An executor or inventory error outside of job execution.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// A policy artifact error.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// The engine was assembled incorrectly.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::Conflict { .. } => "CONFLICT",
            Self::ExecutionFailure(_) => "EXECUTION_FAILURE",
            Self::NoRollbackAvailable { .. } => "NO_ROLLBACK_AVAILABLE",
            Self::PartialRollbackFailure { .. } => "PARTIAL_ROLLBACK_FAILURE",
            Self::RollbackFailed { .. } => "ROLLBACK_FAILED",
            Self::State(_) => "STATE_ERROR",
            Self::Audit(_) => "AUDIT_ERROR",
            Self::Executor(_) => "EXECUTOR_ERROR",
            Self::Policy(_) => "POLICY_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}
