use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of one entry in an [`ErrorResponse`]. Distinct from the HTTP
/// status, which is derived from `error_code`'s family (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLevel {
    Error,
    Warning,
}

/// One error entry. `error_code` is a stable machine-readable family
/// (e.g. `LOADER_NOT_FOUND`, `VALIDATION_REQUIRED_FIELD`); `code_name` is a
/// short human label; `field` is populated for validation errors that
/// target one request field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub level: ErrorLevel,
    pub error_code: String,
    pub code_name: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl WireError {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        let error_code = error_code.into();
        let code_name = error_code.replace('_', " ");
        Self {
            level: ErrorLevel::Error,
            error_code,
            code_name,
            error_message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// The uniform error envelope every `/api/v1` and `/ops/v1` error response
/// carries (`spec.md` §6). `status` is always the literal `"ERROR"` — the
/// real disposition lives in the HTTP status code and in `errors[].level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: &'static str,
    pub errors: Vec<WireError>,
}

impl ErrorResponse {
    pub fn single(now: DateTime<Utc>, request_id: Uuid, error: WireError) -> Self {
        Self {
            request_id,
            timestamp: now,
            status: "ERROR",
            errors: vec![error],
        }
    }
}

/// Maps an `error_code` family to its HTTP status, per `spec.md` §6's
/// table. Suffix match on the family, not the full code, so
/// `LOADER_NOT_FOUND` and `SOURCE_DATABASE_NOT_FOUND` share one rule.
pub fn http_status_for_code(error_code: &str) -> u16 {
    if error_code.ends_with("_NOT_FOUND") {
        404
    } else if error_code.ends_with("_ALREADY_EXISTS") {
        409
    } else if error_code.starts_with("VALIDATION_") {
        400
    } else if error_code.ends_with("_CONNECTION_ERROR") {
        503
    } else if error_code == "UNAUTHORIZED" {
        401
    } else if error_code.starts_with("PERMISSION_") {
        403
    } else if error_code == "INTERNAL_ERROR" {
        500
    } else {
        400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_family_mapping() {
        assert_eq!(http_status_for_code("LOADER_NOT_FOUND"), 404);
        assert_eq!(http_status_for_code("LOADER_ALREADY_EXISTS"), 409);
        assert_eq!(http_status_for_code("VALIDATION_REQUIRED_FIELD"), 400);
        assert_eq!(http_status_for_code("SOURCE_CONNECTION_ERROR"), 503);
        assert_eq!(http_status_for_code("PERMISSION_DENIED"), 403);
        assert_eq!(http_status_for_code("UNAUTHORIZED"), 401);
        assert_eq!(http_status_for_code("INTERNAL_ERROR"), 500);
        assert_eq!(http_status_for_code("SOMETHING_ELSE"), 400);
    }
}
