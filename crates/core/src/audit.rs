use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::job::JobStatus;
use crate::types::{CorrelationId, JobId, TenantId};

/// One recorded status transition (or attempted transition) of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditLogEntry {
    pub id: String,
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub correlation_id: CorrelationId,
    pub actor: String,
    /// `None` for the entry that records job creation.
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub details: serde_json::Value,
}

impl AuditLogEntry {
    /// Build an entry attributed to the context's actor.
    #[must_use]
    pub fn new(
        ctx: &RequestContext,
        job_id: JobId,
        from_status: Option<JobStatus>,
        to_status: JobStatus,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            job_id,
            tenant_id: ctx.tenant_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            actor: ctx.actor.clone(),
            from_status,
            to_status,
            timestamp: Utc::now(),
            details,
        }
    }
}
