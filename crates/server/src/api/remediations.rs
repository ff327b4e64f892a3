//! Remediation job endpoints.
//!
//! Every handler reads the caller's tenant, actor and correlation id from
//! headers and delegates to the orchestrator. Engine errors are mapped to
//! HTTP statuses by [`ServerError`].

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

use remedy_core::{AuditLogEntry, JobId, RemediationJob, RemediationRequest};

use crate::error::{ErrorResponse, ServerError};

use super::{AppState, Caller};

/// Jobs waiting for a human decision.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingResponse {
    pub jobs: Vec<RemediationJob>,
    #[schema(example = 2)]
    pub count: usize,
}

/// Audit entries of one job, oldest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditResponse {
    pub job_id: JobId,
    pub entries: Vec<AuditLogEntry>,
}

/// `POST /v1/remediations` -- submit a request through the approval gate.
#[utoipa::path(
    post,
    path = "/v1/remediations",
    tag = "Remediations",
    summary = "Apply a remediation",
    description = "Validates the request, runs guardrails and impact estimation, then either applies the fix or parks the job for approval.",
    params(
        ("x-tenant-id" = String, Header, description = "Tenant the caller acts for"),
        ("x-correlation-id" = Option<String>, Header, description = "Correlation id, generated when absent"),
        ("x-actor" = Option<String>, Header, description = "Principal recorded in the audit trail"),
    ),
    request_body = RemediationRequest,
    responses(
        (status = 201, description = "Job created", body = RemediationJob),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "An active job already targets the resource", body = ErrorResponse),
    )
)]
pub async fn apply(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(request): Json<RemediationRequest>,
) -> Result<(StatusCode, Json<RemediationJob>), ServerError> {
    let job = state.engine.apply_remediation(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `POST /v1/remediations/approval-requests` -- submit a request that must wait for approval.
#[utoipa::path(
    post,
    path = "/v1/remediations/approval-requests",
    tag = "Remediations",
    summary = "Request approval for a remediation",
    description = "Same checks as apply, but the job always stops at PENDING_APPROVAL.",
    params(("x-tenant-id" = String, Header, description = "Tenant the caller acts for")),
    request_body = RemediationRequest,
    responses(
        (status = 201, description = "Job created", body = RemediationJob),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "An active job already targets the resource", body = ErrorResponse),
    )
)]
pub async fn request_approval(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(request): Json<RemediationRequest>,
) -> Result<(StatusCode, Json<RemediationJob>), ServerError> {
    let job = state
        .engine
        .request_remediation_approval(&ctx, request)
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `GET /v1/remediations/pending` -- jobs awaiting approval.
#[utoipa::path(
    get,
    path = "/v1/remediations/pending",
    tag = "Remediations",
    summary = "List pending remediations",
    params(("x-tenant-id" = String, Header, description = "Tenant the caller acts for")),
    responses(
        (status = 200, description = "Jobs in PENDING_APPROVAL, oldest first", body = PendingResponse),
    )
)]
pub async fn list_pending(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<PendingResponse>, ServerError> {
    let jobs = state.engine.list_pending_remediations(&ctx).await?;
    let count = jobs.len();
    Ok(Json(PendingResponse { jobs, count }))
}

/// `GET /v1/remediations/{id}` -- current job state.
#[utoipa::path(
    get,
    path = "/v1/remediations/{id}",
    tag = "Remediations",
    summary = "Get remediation status",
    params(
        ("id" = String, Path, description = "Job id"),
        ("x-tenant-id" = String, Header, description = "Tenant the caller acts for"),
    ),
    responses(
        (status = 200, description = "The job", body = RemediationJob),
        (status = 404, description = "No such job for this tenant", body = ErrorResponse),
    )
)]
pub async fn status(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<RemediationJob>, ServerError> {
    let job = state
        .engine
        .get_remediation_status(&ctx, &JobId::new(id))
        .await?;
    Ok(Json(job))
}

/// `POST /v1/remediations/{id}/approve` -- approve and execute a pending job.
#[utoipa::path(
    post,
    path = "/v1/remediations/{id}/approve",
    tag = "Remediations",
    summary = "Approve a remediation",
    description = "Re-runs guardrails against live state, records the approver from x-actor, then executes the fix.",
    params(
        ("id" = String, Path, description = "Job id"),
        ("x-tenant-id" = String, Header, description = "Tenant the caller acts for"),
        ("x-actor" = Option<String>, Header, description = "Approver"),
    ),
    responses(
        (status = 200, description = "Job after execution", body = RemediationJob),
        (status = 404, description = "No such job for this tenant", body = ErrorResponse),
        (status = 409, description = "Job is not awaiting approval", body = ErrorResponse),
    )
)]
pub async fn approve(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<RemediationJob>, ServerError> {
    let job = state
        .engine
        .approve_remediation(&ctx, &JobId::new(id))
        .await?;
    Ok(Json(job))
}

/// `POST /v1/remediations/{id}/rollback` -- undo an applied job.
#[utoipa::path(
    post,
    path = "/v1/remediations/{id}/rollback",
    tag = "Remediations",
    summary = "Roll back a remediation",
    params(
        ("id" = String, Path, description = "Job id"),
        ("x-tenant-id" = String, Header, description = "Tenant the caller acts for"),
    ),
    responses(
        (status = 200, description = "Job rolled back", body = RemediationJob),
        (status = 207, description = "Partial rollback; the job stays APPLIED"),
        (status = 404, description = "No such job for this tenant", body = ErrorResponse),
        (status = 409, description = "Nothing to roll back", body = ErrorResponse),
    )
)]
pub async fn rollback(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<RemediationJob>, ServerError> {
    let job = state
        .engine
        .rollback_remediation(&ctx, &JobId::new(id))
        .await?;
    Ok(Json(job))
}

/// `GET /v1/remediations/{id}/audit` -- the job's audit trail.
#[utoipa::path(
    get,
    path = "/v1/remediations/{id}/audit",
    tag = "Remediations",
    summary = "Get a remediation's audit trail",
    params(
        ("id" = String, Path, description = "Job id"),
        ("x-tenant-id" = String, Header, description = "Tenant the caller acts for"),
    ),
    responses(
        (status = 200, description = "Audit entries in append order", body = AuditResponse),
        (status = 404, description = "No such job for this tenant", body = ErrorResponse),
    )
)]
pub async fn audit(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<AuditResponse>, ServerError> {
    let job_id = JobId::new(id);
    let entries = state.engine.audit_trail(&ctx, &job_id).await?;
    Ok(Json(AuditResponse { job_id, entries }))
}
