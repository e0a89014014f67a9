use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{gateway::GatewayError, services::ServiceError};

#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Unique violations are conflicts and foreign-key violations point at a
/// missing parent row. Anything else is answered with `fallback_message`.
fn storage_error(error: &GatewayError, fallback_message: &str) -> ErrorResponse {
    let database_error = match error {
        GatewayError::Database(sqlx::Error::Database(db_err)) => Some(db_err),
        _ => None,
    };

    match database_error {
        Some(db_err) if db_err.is_unique_violation() => {
            ErrorResponse::new(StatusCode::CONFLICT, "resource already exists")
        }
        Some(db_err) if db_err.is_foreign_key_violation() => {
            ErrorResponse::new(StatusCode::NOT_FOUND, "related resource not found")
        }
        _ => ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, fallback_message),
    }
}

/// Maps a service failure to its response. Storage failures are logged here
/// and answered with `fallback_message`.
pub(crate) fn service_error(error: ServiceError, fallback_message: &str) -> ErrorResponse {
    match error {
        ServiceError::NotFound(_) => ErrorResponse::new(StatusCode::NOT_FOUND, error.to_string()),
        ServiceError::Validation(message) => ErrorResponse::new(StatusCode::BAD_REQUEST, message),
        ServiceError::Conflict(message) => ErrorResponse::new(StatusCode::CONFLICT, message),
        ServiceError::Forbidden(message) => ErrorResponse::new(StatusCode::FORBIDDEN, message),
        ServiceError::Upstream(error) => {
            tracing::error!(?error, "{fallback_message}");
            storage_error(&error, fallback_message)
        }
    }
}
