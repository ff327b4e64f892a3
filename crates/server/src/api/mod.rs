pub mod health;
pub mod openapi;
pub mod remediations;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use remedy_core::RequestContext;
use remedy_engine::RemediationOrchestrator;

use crate::error::ServerError;

/// Tenant the caller acts for. Required on every `/v1` route.
pub const TENANT_HEADER: &str = "x-tenant-id";
/// Correlation id; generated when absent.
pub const CORRELATION_HEADER: &str = "x-correlation-id";
/// Principal recorded in the audit trail.
pub const ACTOR_HEADER: &str = "x-actor";
pub const DEFAULT_ACTOR: &str = "anonymous";

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RemediationOrchestrator>,
}

/// The caller's [`RequestContext`], read from the request headers.
#[derive(Debug, Clone)]
pub struct Caller(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let tenant = header(TENANT_HEADER)
            .ok_or_else(|| ServerError::BadRequest(format!("missing {TENANT_HEADER} header")))?;
        let actor = header(ACTOR_HEADER).unwrap_or(DEFAULT_ACTOR);
        let mut ctx = RequestContext::new(tenant, actor);
        if let Some(correlation_id) = header(CORRELATION_HEADER) {
            ctx = ctx.with_correlation_id(correlation_id);
        }
        Ok(Self(ctx))
    }
}

/// Build the Axum router with all API routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/api-doc/openapi.json", get(openapi::openapi_json))
        .route("/v1/remediations", post(remediations::apply))
        .route(
            "/v1/remediations/approval-requests",
            post(remediations::request_approval),
        )
        .route("/v1/remediations/pending", get(remediations::list_pending))
        .route("/v1/remediations/{id}", get(remediations::status))
        .route("/v1/remediations/{id}/approve", post(remediations::approve))
        .route("/v1/remediations/{id}/rollback", post(remediations::rollback))
        .route("/v1/remediations/{id}/audit", get(remediations::audit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
