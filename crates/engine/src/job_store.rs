use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use remedy_core::{
    ImpactEstimate, JobId, JobStatus, RemediationJob, RemediationResult, SafetyCheckResult,
    TenantId,
};
use remedy_state::{CasResult, KeyKind, StateKey, StateStore};

use crate::error::EngineError;

/// Attempts at re-reading a job whose version moved while its status did not.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// A conditional change to a stored job.
///
/// The patch applies only while the job is still in `expected_status`.
#[derive(Debug, Clone)]
pub struct JobPatch {
    pub expected_status: JobStatus,
    /// Operation name used in `InvalidStateTransition` errors.
    pub operation: &'static str,
    pub status: Option<JobStatus>,
    pub safety_checks: Option<SafetyCheckResult>,
    pub estimated_impact: Option<ImpactEstimate>,
    pub result: Option<RemediationResult>,
}

impl JobPatch {
    /// Move the job from `from` to `to`.
    #[must_use]
    pub fn transition(operation: &'static str, from: JobStatus, to: JobStatus) -> Self {
        Self {
            expected_status: from,
            operation,
            status: Some(to),
            safety_checks: None,
            estimated_impact: None,
            result: None,
        }
    }

    #[must_use]
    pub fn with_safety_checks(mut self, checks: SafetyCheckResult) -> Self {
        self.safety_checks = Some(checks);
        self
    }

    #[must_use]
    pub fn with_impact(mut self, impact: ImpactEstimate) -> Self {
        self.estimated_impact = Some(impact);
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: RemediationResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Apply to `job`, enforcing the expected status and lifecycle edges.
    pub fn apply(&self, job: &mut RemediationJob) -> Result<(), EngineError> {
        let invalid = || EngineError::InvalidStateTransition {
            job_id: job.id.clone(),
            from: job.status,
            operation: self.operation,
        };
        if job.status != self.expected_status {
            return Err(invalid());
        }
        if let Some(next) = self.status {
            if !job.status.can_transition_to(next) {
                return Err(invalid());
            }
        }

        if let Some(next) = self.status {
            job.status = next;
        }
        if let Some(checks) = &self.safety_checks {
            job.safety_checks = Some(checks.clone());
        }
        if let Some(impact) = &self.estimated_impact {
            job.estimated_impact = Some(impact.clone());
        }
        if let Some(result) = &self.result {
            job.result = Some(result.clone());
        }
        job.updated_at = Utc::now();
        Ok(())
    }
}

/// Durable storage for remediation jobs.
///
/// The store is the single owner of mutable job state and enforces at most
/// one active job per `(tenant, resource, remediation type)`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new `PENDING` job. Fails with `Conflict` when another active
    /// job holds the same resource key.
    async fn create(&self, job: RemediationJob) -> Result<JobId, EngineError>;

    /// Fetch a job within a tenant.
    async fn get(
        &self,
        tenant: &TenantId,
        id: &JobId,
    ) -> Result<Option<RemediationJob>, EngineError>;

    /// Apply `patch` atomically and return the updated job.
    async fn update(
        &self,
        tenant: &TenantId,
        id: &JobId,
        patch: JobPatch,
    ) -> Result<RemediationJob, EngineError>;

    /// All jobs of a tenant in `status`, oldest first.
    async fn find_by_status(
        &self,
        tenant: &TenantId,
        status: JobStatus,
    ) -> Result<Vec<RemediationJob>, EngineError>;
}

/// [`JobStore`] backed by any [`StateStore`].
///
/// Job records live under [`KeyKind::Job`] keyed by job id. The active slot
/// lives under [`KeyKind::ActiveJob`] keyed by `resource_id:remediation_type`
/// and holds the owning job id. A job whose slot cannot be claimed has its
/// record removed again.
pub struct StateJobStore {
    state: Arc<dyn StateStore>,
    namespace: String,
}

impl StateJobStore {
    pub fn new(state: Arc<dyn StateStore>, namespace: impl Into<String>) -> Self {
        Self {
            state,
            namespace: namespace.into(),
        }
    }

    fn job_key(&self, tenant: &TenantId, id: &JobId) -> StateKey {
        StateKey::new(&*self.namespace, tenant.clone(), KeyKind::Job, id.as_str())
    }

    fn slot_key(&self, job: &RemediationJob) -> StateKey {
        StateKey::new(
            &*self.namespace,
            job.tenant_id().clone(),
            KeyKind::ActiveJob,
            format!(
                "{}:{}",
                job.request.resource_id, job.request.remediation_type
            ),
        )
    }

    /// Claim the active slot for `job`, reclaiming it when the recorded
    /// owner is gone or no longer active.
    ///
    /// Job records are written before their slot is claimed, so an owner
    /// without a record is stale rather than in flight.
    async fn claim_slot(&self, job: &RemediationJob) -> Result<(), EngineError> {
        let key = self.slot_key(job);
        if self.state.check_and_set(&key, job.id.as_str()).await? {
            return Ok(());
        }

        let conflict = |holder: Option<String>| EngineError::Conflict {
            resource_key: job.request.resource_key(),
            active_job: holder.map(JobId::new),
        };

        let Some(slot) = self.state.get_versioned(&key).await? else {
            // Released between the claim and this read.
            return if self.state.check_and_set(&key, job.id.as_str()).await? {
                Ok(())
            } else {
                Err(conflict(self.state.get(&key).await?))
            };
        };

        let holder = JobId::new(slot.value.clone());
        let holder_active = self
            .get(job.tenant_id(), &holder)
            .await?
            .is_some_and(|owner| owner.status.is_active());
        if holder_active {
            return Err(conflict(Some(slot.value)));
        }

        debug!(slot = %key, stale_owner = %holder, "reclaiming stale active slot");
        match self
            .state
            .compare_and_swap(&key, slot.version, job.id.as_str())
            .await?
        {
            CasResult::Ok => Ok(()),
            CasResult::Conflict { current_value, .. } => Err(conflict(current_value)),
        }
    }

    /// Release the slot if `job` still owns it.
    ///
    /// The delete is conditional on the version read here, so a slot
    /// reclaimed by a newer job in the meantime is left alone.
    async fn release_slot(&self, job: &RemediationJob) -> Result<(), EngineError> {
        let key = self.slot_key(job);
        if let Some(slot) = self.state.get_versioned(&key).await? {
            if slot.value == job.id.as_str()
                && !self.state.delete_if_version(&key, slot.version).await?
            {
                debug!(slot = %key, job.id = %job.id, "slot changed hands before release");
            }
        }
        Ok(())
    }

    fn decode(raw: &str) -> Result<RemediationJob, EngineError> {
        serde_json::from_str(raw).map_err(|e| EngineError::State(e.into()))
    }

    fn encode(job: &RemediationJob) -> Result<String, EngineError> {
        serde_json::to_string(job).map_err(|e| EngineError::State(e.into()))
    }
}

#[async_trait]
impl JobStore for StateJobStore {
    async fn create(&self, job: RemediationJob) -> Result<JobId, EngineError> {
        if job.status != JobStatus::Pending {
            return Err(EngineError::InvalidStateTransition {
                job_id: job.id.clone(),
                from: job.status,
                operation: "create",
            });
        }

        let key = self.job_key(job.tenant_id(), &job.id);
        let raw = Self::encode(&job)?;
        if let CasResult::Conflict { .. } = self.state.compare_and_swap(&key, 0, &raw).await? {
            return Err(EngineError::Conflict {
                resource_key: job.request.resource_key(),
                active_job: Some(job.id),
            });
        }

        if let Err(e) = self.claim_slot(&job).await {
            if let Err(cleanup) = self.state.delete_if_version(&key, 1).await {
                warn!(job.id = %job.id, error = %cleanup, "failed to remove unclaimed job record");
            }
            return Err(e);
        }
        Ok(job.id)
    }

    async fn get(
        &self,
        tenant: &TenantId,
        id: &JobId,
    ) -> Result<Option<RemediationJob>, EngineError> {
        match self.state.get(&self.job_key(tenant, id)).await? {
            Some(raw) => Self::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        tenant: &TenantId,
        id: &JobId,
        patch: JobPatch,
    ) -> Result<RemediationJob, EngineError> {
        let key = self.job_key(tenant, id);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let Some(current) = self.state.get_versioned(&key).await? else {
                return Err(EngineError::NotFound(id.clone()));
            };
            let mut job = Self::decode(&current.value)?;
            patch.apply(&mut job)?;
            let raw = Self::encode(&job)?;

            match self
                .state
                .compare_and_swap(&key, current.version, &raw)
                .await?
            {
                CasResult::Ok => {
                    if !job.status.is_active() && patch.expected_status.is_active() {
                        if let Err(e) = self.release_slot(&job).await {
                            warn!(job.id = %job.id, error = %e, "failed to release active slot");
                        }
                    }
                    return Ok(job);
                }
                CasResult::Conflict { .. } => {
                    debug!(job.id = %id, attempt, "job changed during update, retrying");
                }
            }
        }

        Err(EngineError::Conflict {
            resource_key: format!("{tenant}:{id}"),
            active_job: Some(id.clone()),
        })
    }

    async fn find_by_status(
        &self,
        tenant: &TenantId,
        status: JobStatus,
    ) -> Result<Vec<RemediationJob>, EngineError> {
        let entries = self
            .state
            .scan_keys(&self.namespace, tenant.as_str(), KeyKind::Job, None)
            .await?;

        let mut jobs = Vec::new();
        for (key, raw) in entries {
            match Self::decode(&raw) {
                Ok(job) if job.status == status => jobs.push(job),
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable job record"),
            }
        }
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }
}
