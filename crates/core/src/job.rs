use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impact::ImpactEstimate;
use crate::outcome::RemediationResult;
use crate::request::RemediationRequest;
use crate::safety::SafetyCheckResult;
use crate::types::{JobId, TenantId};

/// Lifecycle state of a remediation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    PendingApproval,
    Approved,
    Applied,
    Failed,
    RolledBack,
}

impl JobStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::PendingApproval,
        Self::Approved,
        Self::Applied,
        Self::Failed,
        Self::RolledBack,
    ];

    /// Return the wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Applied => "APPLIED",
            Self::Failed => "FAILED",
            Self::RolledBack => "ROLLED_BACK",
        }
    }

    /// Parse the wire representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Whether `self -> next` is an edge of the job lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::PendingApproval | Self::Approved | Self::Failed
            ) | (Self::PendingApproval, Self::Approved)
                | (Self::Approved, Self::Applied | Self::Failed)
                | (Self::Applied, Self::RolledBack)
        )
    }

    /// Active jobs hold the `(tenant, resource, remediation type)` slot.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::PendingApproval | Self::Approved)
    }

    /// No further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::RolledBack)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remediation attempt and everything recorded about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemediationJob {
    pub id: JobId,
    pub request: RemediationRequest,
    pub status: JobStatus,
    #[serde(default)]
    pub safety_checks: Option<SafetyCheckResult>,
    #[serde(default)]
    pub estimated_impact: Option<ImpactEstimate>,
    #[serde(default)]
    pub result: Option<RemediationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemediationJob {
    /// A fresh `PENDING` job for `request`.
    #[must_use]
    pub fn new(request: RemediationRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            request,
            status: JobStatus::Pending,
            safety_checks: None,
            estimated_impact: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        &self.request.tenant_id
    }
}
