use axum::Json;
use utoipa::OpenApi;

use remedy_core::{
    AuditLogEntry, Change, CorrelationId, ImpactEstimate, JobId, JobStatus, RemediationJob,
    RemediationRequest, RemediationResult, RiskLevel, RollbackDescriptor, RollbackResult,
    SafetyCheck, SafetyCheckResult, Severity, TenantId,
};

use crate::error::ErrorResponse;

use super::health::{ExecutorInfo, HealthResponse, MetricsResponse};
use super::remediations::{AuditResponse, PendingResponse};
use super::{health, remediations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "remedy",
        description = "Remediation workflow engine: guarded, approved and reversible fixes for compliance findings."
    ),
    paths(
        health::health,
        health::metrics,
        remediations::apply,
        remediations::request_approval,
        remediations::list_pending,
        remediations::status,
        remediations::approve,
        remediations::rollback,
        remediations::audit,
    ),
    components(schemas(
        RemediationRequest,
        RemediationJob,
        JobStatus,
        JobId,
        TenantId,
        CorrelationId,
        SafetyCheck,
        SafetyCheckResult,
        Severity,
        ImpactEstimate,
        RiskLevel,
        RemediationResult,
        Change,
        RollbackDescriptor,
        RollbackResult,
        AuditLogEntry,
        PendingResponse,
        AuditResponse,
        HealthResponse,
        MetricsResponse,
        ExecutorInfo,
        ErrorResponse,
    )),
    tags(
        (name = "Remediations", description = "Submit, approve, inspect and roll back remediation jobs"),
        (name = "Health", description = "Liveness and metrics"),
    )
)]
pub struct ApiDoc;

/// `GET /api-doc/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
