use async_trait::async_trait;
use dashmap::DashMap;

use remedy_audit::error::AuditError;
use remedy_audit::store::AuditStore;
use remedy_core::{AuditLogEntry, JobId, TenantId};

/// In-memory audit store using `DashMap`. Suitable for development and testing.
///
/// Entries are grouped per `(tenant, job)` in append order.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    entries: DashMap<(TenantId, JobId), Vec<AuditLogEntry>>,
}

impl MemoryAuditStore {
    /// Create a new empty in-memory audit store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all jobs.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        self.entries
            .entry((entry.tenant_id.clone(), entry.job_id.clone()))
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn list_for_job(
        &self,
        tenant: &TenantId,
        job_id: &JobId,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .entries
            .get(&(tenant.clone(), job_id.clone()))
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}
