use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use utoipa::ToSchema;

use remedy_engine::MetricsSnapshot;

use super::AppState;

/// Engine counters.
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsResponse {
    pub requested: u64,
    pub auto_applied: u64,
    pub pending_approval: u64,
    pub approved: u64,
    pub applied: u64,
    pub failed: u64,
    pub rolled_back: u64,
    pub partial_rollbacks: u64,
    pub conflicts: u64,
    pub audit_failures: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snap: MetricsSnapshot) -> Self {
        Self {
            requested: snap.requested,
            auto_applied: snap.auto_applied,
            pending_approval: snap.pending_approval,
            approved: snap.approved,
            applied: snap.applied,
            failed: snap.failed,
            rolled_back: snap.rolled_back,
            partial_rollbacks: snap.partial_rollbacks,
            conflicts: snap.conflicts,
            audit_failures: snap.audit_failures,
        }
    }
}

/// A registered fix executor.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutorInfo {
    #[schema(example = "S3_BUCKET")]
    pub resource_type: String,
    #[schema(example = "ENABLE_BUCKET_ENCRYPTION")]
    pub remediation_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// Version of the loaded policy artifact.
    pub policy_version: u32,
    pub executors: Vec<ExecutorInfo>,
    pub metrics: MetricsResponse,
}

/// `GET /health` -- service status, loaded policy and a metrics snapshot.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let engine = &state.engine;
    let executors = engine
        .registry()
        .list()
        .into_iter()
        .map(|(resource_type, remediation_type)| ExecutorInfo {
            resource_type: resource_type.to_owned(),
            remediation_type: remediation_type.to_owned(),
        })
        .collect();

    let body = HealthResponse {
        status: "ok".into(),
        policy_version: engine.policy().version,
        executors,
        metrics: engine.metrics().snapshot().into(),
    };
    (StatusCode::OK, Json(body))
}

/// `GET /metrics` -- engine counters as JSON.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    summary = "Engine metrics",
    responses(
        (status = 200, description = "Current metric counters", body = MetricsResponse)
    )
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = MetricsResponse::from(state.engine.metrics().snapshot());
    (StatusCode::OK, Json(body))
}
