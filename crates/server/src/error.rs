use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use remedy_engine::EngineError;

/// Errors that can occur when running the remedy server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The request is missing something the engine never sees, such as the
    /// tenant header.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable message.
    #[schema(example = "no remediation job abc")]
    pub error: String,
    /// Stable machine-readable code.
    #[schema(example = "NOT_FOUND")]
    pub code: String,
}

impl ServerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIGURATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Engine(e) => e.code(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Engine(EngineError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Engine(EngineError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Engine(
                EngineError::InvalidStateTransition { .. }
                | EngineError::Conflict { .. }
                | EngineError::NoRollbackAvailable { .. },
            ) => StatusCode::CONFLICT,
            Self::Engine(EngineError::PartialRollbackFailure { .. }) => StatusCode::MULTI_STATUS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let code = self.code();
        let message = self.to_string();
        let body = match self {
            // The job is still APPLIED; report it alongside the rollback
            // outcome so callers can see what was and was not restored.
            Self::Engine(EngineError::PartialRollbackFailure { job, result }) => {
                serde_json::json!({
                    "error": message,
                    "code": code,
                    "partial_rollback": true,
                    "job": job,
                    "rollback": result,
                })
            }
            Self::Engine(EngineError::Conflict { active_job, .. }) => serde_json::json!({
                "error": message,
                "code": code,
                "active_job": active_job,
            }),
            _ => serde_json::json!({ "error": message, "code": code }),
        };

        (status, Json(body)).into_response()
    }
}
