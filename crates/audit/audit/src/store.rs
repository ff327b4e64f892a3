use async_trait::async_trait;

use remedy_core::{AuditLogEntry, JobId, TenantId};

use crate::error::AuditError;

/// Append-only sink for job status transitions.
///
/// Implementations must be `Send + Sync` to be shared across async tasks.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one entry. Entries are never modified afterwards.
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditError>;

    /// All entries for a job, in the order they were appended.
    async fn list_for_job(
        &self,
        tenant: &TenantId,
        job_id: &JobId,
    ) -> Result<Vec<AuditLogEntry>, AuditError>;
}
