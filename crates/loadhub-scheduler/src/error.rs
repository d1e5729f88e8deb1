//! API boundary error translation: every handler returns `Result<T, ApiError>`,
//! and `ApiError` is the only site that builds the uniform wire envelope
//! (`spec.md` §6/§7). Internal failures (`anyhow::Error`) never leak past
//! this boundary as their original message — they're logged with a
//! correlation id and surfaced as a generic `INTERNAL_ERROR`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use loadhub_schemas::{ErrorResponse, WireError};
use uuid::Uuid;

pub struct ApiError {
    request_id: Uuid,
    wire: WireError,
}

impl ApiError {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            wire: WireError::new(error_code, message),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.wire = self.wire.with_field(field);
        self
    }

    pub fn not_found(resource: &str, key: &str) -> Self {
        Self::new(format!("{resource}_NOT_FOUND"), format!("{resource} '{key}' not found"))
    }

    pub fn permission_denied(action_code: &str) -> Self {
        Self::new(
            "PERMISSION_DENIED",
            format!("current role(s) do not permit '{action_code}' in this state"),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_REQUIRED_FIELD", message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let request_id = Uuid::new_v4();
        tracing::error!(%request_id, error = %err, "unhandled internal error");
        Self {
            request_id,
            wire: WireError::new("INTERNAL_ERROR", "an internal error occurred"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = loadhub_schemas::error::http_status_for_code(&self.wire.error_code);
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
        let body = ErrorResponse::single(chrono::Utc::now(), self.request_id, self.wire);
        (status, Json(body)).into_response()
    }
}
