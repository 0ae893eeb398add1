//! JSON error responses for the web adapter.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::domain::error::ScreenerError;

const INTERNAL_MESSAGE: &str = "An error occurred while processing your request!";

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
    /// Per-field reasons, rendered as the `errors` object.
    pub errors: BTreeMap<String, String>,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    pub fn with_error(mut self, field: impl Into<String>, reason: impl Into<String>) -> Self {
        self.errors.insert(field.into(), reason.into());
        self
    }
}

pub fn status_from_error(err: &ScreenerError) -> StatusCode {
    match err {
        ScreenerError::InvalidParameters(_)
        | ScreenerError::Validation { .. }
        | ScreenerError::Conflict { .. } => StatusCode::BAD_REQUEST,
        ScreenerError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        ScreenerError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ScreenerError::NotFound { .. } => StatusCode::NOT_FOUND,
        ScreenerError::Database { .. }
        | ScreenerError::DatabaseQuery { .. }
        | ScreenerError::ConfigParse { .. }
        | ScreenerError::ConfigMissing { .. }
        | ScreenerError::ConfigInvalid { .. }
        | ScreenerError::PasswordHash { .. }
        | ScreenerError::Notify { .. }
        | ScreenerError::Mail { .. }
        | ScreenerError::Csv { .. }
        | ScreenerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ScreenerError> for WebError {
    fn from(err: ScreenerError) -> Self {
        let status = status_from_error(&err);
        match err {
            ScreenerError::InvalidParameters(errors) => Self {
                status,
                message: "Invalid query parameters.".to_string(),
                errors: errors.as_map().clone(),
            },
            ScreenerError::Validation { field, reason } => {
                Self::new(status, reason.clone()).with_error(field, reason)
            }
            ScreenerError::Unauthorized { reason }
            | ScreenerError::Forbidden { reason }
            | ScreenerError::Conflict { reason } => Self::new(status, reason),
            ScreenerError::NotFound { .. } => Self::new(status, err.to_string()),
            other => {
                tracing::error!(error = %other, "request failed");
                Self::internal()
            }
        }
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Malformed request body.").with_error("body", rejection.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = if self.errors.is_empty() {
            json!({ "status": "error", "message": self.message })
        } else {
            json!({ "status": "error", "message": self.message, "errors": self.errors })
        };
        (self.status, Json(body)).into_response()
    }
}
