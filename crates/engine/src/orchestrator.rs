use std::sync::Arc;

use serde_json::json;
use tracing::{Span, error, field, info, instrument, warn};

use remedy_audit::AuditStore;
use remedy_core::{
    AuditLogEntry, JobId, JobStatus, RemediationJob, RemediationRequest, RemediationResult,
    RequestContext, SafetyCheckResult, ValidationError,
};
use remedy_executor::{ExecutorRegistry, ResourceInventory};

use crate::approval::ApprovalWorkflow;
use crate::error::EngineError;
use crate::gate::{ApprovalGate, GateDecision};
use crate::guardrail::{GuardrailContext, GuardrailEngine};
use crate::impact::ImpactEstimator;
use crate::job_store::{JobPatch, JobStore};
use crate::metrics::EngineMetrics;
use crate::policy::Policy;
use crate::rollback::RollbackManager;

/// Actor recorded when the gate approves a job without a human.
pub const GATE_ACTOR: &str = "system:approval-gate";

/// Drives remediation jobs through their lifecycle.
///
/// Every status change is persisted through the [`JobStore`] first and then
/// mirrored to the [`AuditStore`]. Build one with
/// [`OrchestratorBuilder`](crate::OrchestratorBuilder).
pub struct RemediationOrchestrator {
    pub(crate) jobs: Arc<dyn JobStore>,
    pub(crate) audit: Arc<dyn AuditStore>,
    pub(crate) registry: Arc<ExecutorRegistry>,
    pub(crate) inventory: Arc<dyn ResourceInventory>,
    pub(crate) guardrails: GuardrailEngine,
    pub(crate) estimator: ImpactEstimator,
    pub(crate) gate: ApprovalGate,
    pub(crate) approvals: Arc<dyn ApprovalWorkflow>,
    pub(crate) rollbacks: RollbackManager,
    pub(crate) policy: Arc<Policy>,
    pub(crate) metrics: Arc<EngineMetrics>,
}

impl std::fmt::Debug for RemediationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationOrchestrator")
            .field("policy_version", &self.policy.version)
            .field("executors", &self.registry.list())
            .field("guardrails", &self.guardrails)
            .finish_non_exhaustive()
    }
}

impl RemediationOrchestrator {
    /// Create a job and let the approval gate decide whether to apply it now.
    ///
    /// Returns the job in its resulting status: `APPLIED` or `FAILED` when it
    /// ran, `PENDING_APPROVAL` when it waits for a human, `FAILED` when
    /// impact estimation could not complete.
    #[instrument(
        name = "remedy.apply",
        skip(self, ctx, request),
        fields(
            tenant = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
            job.id = field::Empty,
        )
    )]
    pub async fn apply_remediation(
        &self,
        ctx: &RequestContext,
        request: RemediationRequest,
    ) -> Result<RemediationJob, EngineError> {
        self.submit(ctx, request, false).await
    }

    /// Create a job that always waits for human approval.
    #[instrument(
        name = "remedy.request_approval",
        skip(self, ctx, request),
        fields(
            tenant = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
            job.id = field::Empty,
        )
    )]
    pub async fn request_remediation_approval(
        &self,
        ctx: &RequestContext,
        request: RemediationRequest,
    ) -> Result<RemediationJob, EngineError> {
        self.submit(ctx, request, true).await
    }

    /// Approve a `PENDING_APPROVAL` job and execute it.
    ///
    /// Guardrails and the impact estimate are refreshed against live state
    /// first and stored on the job; the human decision is not re-gated.
    #[instrument(
        name = "remedy.approve",
        skip(self, ctx, job_id),
        fields(
            tenant = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
            job.id = %job_id,
        )
    )]
    pub async fn approve_remediation(
        &self,
        ctx: &RequestContext,
        job_id: &JobId,
    ) -> Result<RemediationJob, EngineError> {
        let job = self.load(ctx, job_id).await?;
        if job.status != JobStatus::PendingApproval {
            return Err(EngineError::InvalidStateTransition {
                job_id: job.id,
                from: job.status,
                operation: "approve",
            });
        }

        let checks = self.run_guardrails(&job).await;
        let (impact, refresh_error) = match self.estimator.estimate(&job.request).await {
            Ok(impact) => (Some(impact), None),
            Err(e) => {
                warn!(error = %e, "impact refresh failed, keeping the stored estimate");
                (None, Some(e.to_string()))
            }
        };

        let mut patch = JobPatch::transition(
            "approve",
            JobStatus::PendingApproval,
            JobStatus::Approved,
        )
        .with_safety_checks(checks);
        if let Some(impact) = impact {
            patch = patch.with_impact(impact);
        }
        let job = self.jobs.update(&ctx.tenant_id, job_id, patch).await?;

        self.record(
            ctx,
            &job.id,
            Some(JobStatus::PendingApproval),
            JobStatus::Approved,
            json!({
                "approved_by": ctx.actor,
                "safety_checks": job.safety_checks,
                "estimated_impact": job.estimated_impact,
                "impact_refresh_error": refresh_error,
            }),
        )
        .await;
        self.metrics.increment_approved();
        info!(approved_by = %ctx.actor, "remediation approved");

        self.execute(ctx, job).await
    }

    /// Undo an `APPLIED` job using its recorded rollback descriptor.
    ///
    /// A full rollback moves the job to `ROLLED_BACK`. A partial one leaves
    /// it `APPLIED` and fails with `PartialRollbackFailure`.
    #[instrument(
        name = "remedy.rollback",
        skip(self, ctx, job_id),
        fields(
            tenant = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
            job.id = %job_id,
        )
    )]
    pub async fn rollback_remediation(
        &self,
        ctx: &RequestContext,
        job_id: &JobId,
    ) -> Result<RemediationJob, EngineError> {
        let job = self.load(ctx, job_id).await?;
        let outcome = self.rollbacks.rollback(&job).await?;

        if outcome.success {
            let updated = self
                .jobs
                .update(
                    &ctx.tenant_id,
                    job_id,
                    JobPatch::transition("rollback", JobStatus::Applied, JobStatus::RolledBack),
                )
                .await;
            let job = match updated {
                Ok(job) => job,
                Err(e) => {
                    // The inverse already ran; keep evidence of it.
                    warn!(error = %e, "rolled back resource but could not record ROLLED_BACK");
                    self.record(
                        ctx,
                        job_id,
                        Some(JobStatus::Applied),
                        JobStatus::Applied,
                        json!({
                            "partial_rollback": false,
                            "rollback": outcome,
                            "status_update_error": e.to_string(),
                        }),
                    )
                    .await;
                    return Err(e);
                }
            };
            self.record(
                ctx,
                job_id,
                Some(JobStatus::Applied),
                JobStatus::RolledBack,
                json!({ "partial_rollback": false, "rollback": outcome }),
            )
            .await;
            self.metrics.increment_rolled_back();
            info!("remediation rolled back");
            return Ok(job);
        }

        self.record(
            ctx,
            job_id,
            Some(JobStatus::Applied),
            JobStatus::Applied,
            json!({ "partial_rollback": outcome.partial_rollback, "rollback": outcome }),
        )
        .await;

        if outcome.partial_rollback {
            self.metrics.increment_partial_rollbacks();
            warn!(failed = ?outcome.failed, "remediation partially rolled back");
            Err(EngineError::PartialRollbackFailure {
                job: Box::new(job),
                result: outcome,
            })
        } else {
            warn!(message = %outcome.message, "rollback restored nothing");
            Err(EngineError::RollbackFailed {
                job_id: job.id,
                message: outcome.message,
            })
        }
    }

    /// Read a job. Never mutates the job or the audit trail.
    #[instrument(
        name = "remedy.status",
        skip(self, ctx, job_id),
        fields(
            tenant = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
            job.id = %job_id,
        )
    )]
    pub async fn get_remediation_status(
        &self,
        ctx: &RequestContext,
        job_id: &JobId,
    ) -> Result<RemediationJob, EngineError> {
        self.load(ctx, job_id).await
    }

    /// Jobs of the caller's tenant waiting for approval, oldest first.
    #[instrument(
        name = "remedy.list_pending",
        skip(self, ctx),
        fields(tenant = %ctx.tenant_id, correlation_id = %ctx.correlation_id)
    )]
    pub async fn list_pending_remediations(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<RemediationJob>, EngineError> {
        self.jobs
            .find_by_status(&ctx.tenant_id, JobStatus::PendingApproval)
            .await
    }

    /// Audit entries of a job in the order they were written.
    #[instrument(
        name = "remedy.audit_trail",
        skip(self, ctx, job_id),
        fields(
            tenant = %ctx.tenant_id,
            correlation_id = %ctx.correlation_id,
            job.id = %job_id,
        )
    )]
    pub async fn audit_trail(
        &self,
        ctx: &RequestContext,
        job_id: &JobId,
    ) -> Result<Vec<AuditLogEntry>, EngineError> {
        self.load(ctx, job_id).await?;
        Ok(self.audit.list_for_job(&ctx.tenant_id, job_id).await?)
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    async fn submit(
        &self,
        ctx: &RequestContext,
        request: RemediationRequest,
        force_approval: bool,
    ) -> Result<RemediationJob, EngineError> {
        self.metrics.increment_requested();
        self.validate(ctx, &request)?;

        let job = RemediationJob::new(request);
        let job_id = match self.jobs.create(job.clone()).await {
            Ok(id) => id,
            Err(e @ EngineError::Conflict { .. }) => {
                self.metrics.increment_conflicts();
                warn!(resource_key = %job.request.resource_key(), "active remediation already exists");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        Span::current().record("job.id", field::display(&job_id));

        let request = &job.request;
        self.record(
            ctx,
            &job_id,
            None,
            JobStatus::Pending,
            json!({
                "finding_id": request.finding_id,
                "remediation_type": request.remediation_type,
                "resource_type": request.resource_type,
                "resource_id": request.resource_id,
                "requested_by": request.requested_by,
                "auto_approve": request.auto_approve,
                "dry_run": request.dry_run,
                "policy_version": self.policy.version,
            }),
        )
        .await;

        let checks = self.run_guardrails(&job).await;
        let impact = match self.estimator.estimate(request).await {
            Ok(impact) => impact,
            Err(e) => return self.fail_estimation(ctx, &job_id, checks, &e).await,
        };

        let mut outcome = self.gate.decide(request, &checks, &impact);
        if force_approval && !outcome.requires_approval() {
            outcome.decision = GateDecision::RequireApproval;
            outcome
                .reasons
                .insert(0, "approval explicitly requested".into());
        }
        let details = json!({
            "decision": outcome.decision,
            "reasons": outcome.reasons,
            "safety_checks_passed": checks.passed,
            "risk_level": impact.risk_level,
        });

        if outcome.requires_approval() {
            let job = self
                .jobs
                .update(
                    &ctx.tenant_id,
                    &job_id,
                    JobPatch::transition(
                        "request approval",
                        JobStatus::Pending,
                        JobStatus::PendingApproval,
                    )
                    .with_safety_checks(checks)
                    .with_impact(impact),
                )
                .await?;
            self.record(
                ctx,
                &job_id,
                Some(JobStatus::Pending),
                JobStatus::PendingApproval,
                details,
            )
            .await;
            self.metrics.increment_pending_approval();
            info!(reasons = ?outcome.reasons, "remediation awaiting approval");

            if let Err(e) = self.approvals.request_approval(&job).await {
                warn!(error = %e, "approval workflow notification failed");
            }
            return Ok(job);
        }

        let job = self
            .jobs
            .update(
                &ctx.tenant_id,
                &job_id,
                JobPatch::transition("auto-approve", JobStatus::Pending, JobStatus::Approved)
                    .with_safety_checks(checks)
                    .with_impact(impact),
            )
            .await?;
        self.record(
            &ctx.as_actor(GATE_ACTOR),
            &job_id,
            Some(JobStatus::Pending),
            JobStatus::Approved,
            details,
        )
        .await;
        self.metrics.increment_auto_applied();

        self.execute(ctx, job).await
    }

    fn validate(
        &self,
        ctx: &RequestContext,
        request: &RemediationRequest,
    ) -> Result<(), EngineError> {
        request.validate()?;
        if request.tenant_id != ctx.tenant_id {
            return Err(ValidationError::InvalidField {
                field: "tenant_id",
                reason: format!(
                    "request tenant {} does not match caller tenant {}",
                    request.tenant_id, ctx.tenant_id
                ),
            }
            .into());
        }
        if !self
            .registry
            .contains(&request.resource_type, &request.remediation_type)
        {
            return Err(ValidationError::InvalidField {
                field: "remediation_type",
                reason: format!(
                    "no executor registered for {}/{}",
                    request.resource_type, request.remediation_type
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Run the executor for an `APPROVED` job and persist the outcome.
    async fn execute(
        &self,
        ctx: &RequestContext,
        job: RemediationJob,
    ) -> Result<RemediationJob, EngineError> {
        let request = &job.request;
        let Some(executor) = self
            .registry
            .get(&request.resource_type, &request.remediation_type)
        else {
            let message = format!(
                "no executor registered for {}/{}",
                request.resource_type, request.remediation_type
            );
            self.finish(ctx, &job.id, RemediationResult::failure(message.clone()))
                .await?;
            return Err(EngineError::ExecutionFailure(message));
        };

        let result = match executor.execute(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(executor = executor.kind(), error = %e, "executor failed");
                RemediationResult::failure(format!("executor error: {e}"))
            }
        };
        self.finish(ctx, &job.id, result).await
    }

    /// Move an `APPROVED` job to `APPLIED` or `FAILED` according to `result`.
    async fn finish(
        &self,
        ctx: &RequestContext,
        job_id: &JobId,
        result: RemediationResult,
    ) -> Result<RemediationJob, EngineError> {
        let next = if result.success {
            JobStatus::Applied
        } else {
            JobStatus::Failed
        };
        let mut details = json!({
            "success": result.success,
            "message": result.message,
            "dry_run": result.dry_run,
            "changes": result.changes.len(),
            "reversible": result.is_reversible(),
        });
        // FAILED jobs cannot be rolled back through the engine, so a
        // partially applied fix is left to an operator.
        let partial = !result.success && !result.changes.is_empty();
        if let Some(descriptor) = result.rollback.as_ref().filter(|_| partial) {
            warn!(
                changes = result.changes.len(),
                "execution failed part-way; manual action required"
            );
            details["manual_action_required"] = json!(true);
            details["manual_steps"] = json!(descriptor.instructions);
        }

        let job = match self
            .jobs
            .update(
                &ctx.tenant_id,
                job_id,
                JobPatch::transition("execute", JobStatus::Approved, next).with_result(result),
            )
            .await
        {
            Ok(job) => job,
            Err(e) => {
                error!(status = %next, error = %e, "failed to persist execution outcome");
                return Err(e);
            }
        };

        self.record(ctx, job_id, Some(JobStatus::Approved), next, details)
            .await;
        if next == JobStatus::Applied {
            self.metrics.increment_applied();
            info!(dry_run = job.result.as_ref().is_some_and(|r| r.dry_run), "remediation applied");
        } else {
            self.metrics.increment_failed();
            warn!("remediation failed");
        }
        Ok(job)
    }

    async fn fail_estimation(
        &self,
        ctx: &RequestContext,
        job_id: &JobId,
        checks: SafetyCheckResult,
        cause: &EngineError,
    ) -> Result<RemediationJob, EngineError> {
        warn!(error = %cause, "impact estimation failed");
        let job = self
            .jobs
            .update(
                &ctx.tenant_id,
                job_id,
                JobPatch::transition("estimate impact", JobStatus::Pending, JobStatus::Failed)
                    .with_safety_checks(checks)
                    .with_result(RemediationResult::failure(format!(
                        "impact estimation failed: {cause}"
                    ))),
            )
            .await?;
        self.record(
            ctx,
            job_id,
            Some(JobStatus::Pending),
            JobStatus::Failed,
            json!({ "reason": "impact estimation failed", "error": cause.to_string() }),
        )
        .await;
        self.metrics.increment_failed();
        Ok(job)
    }

    async fn run_guardrails(&self, job: &RemediationJob) -> SafetyCheckResult {
        let ctx = GuardrailContext {
            request: &job.request,
            job_id: Some(&job.id),
            inventory: self.inventory.as_ref(),
            jobs: self.jobs.as_ref(),
        };
        self.guardrails.run(&ctx).await
    }

    async fn load(&self, ctx: &RequestContext, job_id: &JobId) -> Result<RemediationJob, EngineError> {
        self.jobs
            .get(&ctx.tenant_id, job_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(job_id.clone()))
    }

    /// Append an audit entry. Failures are logged and counted, never returned.
    async fn record(
        &self,
        ctx: &RequestContext,
        job_id: &JobId,
        from: Option<JobStatus>,
        to: JobStatus,
        details: serde_json::Value,
    ) {
        let entry = AuditLogEntry::new(ctx, job_id.clone(), from, to, details);
        if let Err(e) = self.audit.append(entry).await {
            self.metrics.increment_audit_failures();
            error!(
                job.id = %job_id,
                from = ?from,
                to = %to,
                error = %e,
                "failed to append audit entry"
            );
        }
    }
}
