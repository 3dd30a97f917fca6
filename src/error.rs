use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("gateway failure: {message}")]
    Gateway {
        message: String,
        details: Option<Value>,
    },

    #[error("malformed callback payload")]
    MalformedCallback,

    #[error("callback carries no order reference")]
    OrderReferenceMissing,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code carried in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::InvalidStatus(_) => "invalid_status",
            AppError::DriverUnavailable(_) => "driver_unavailable",
            AppError::Gateway { .. } => "gateway_failure",
            AppError::MalformedCallback => "malformed_callback",
            AppError::OrderReferenceMissing => "order_reference_missing",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidTransition(_)
            | AppError::InvalidStatus(_)
            | AppError::DriverUnavailable(_)
            | AppError::Gateway { .. }
            | AppError::MalformedCallback
            | AppError::OrderReferenceMissing => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short form for the payment provider: code only, no internal detail.
    pub fn into_terse_response(self) -> Response {
        let body = Json(json!({ "error": self.code() }));
        (self.status(), body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            AppError::Gateway { message, details } => json!({
                "error": code,
                "message": message,
                "details": details,
            }),
            AppError::Validation(msg)
            | AppError::Forbidden(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidTransition(msg)
            | AppError::InvalidStatus(msg)
            | AppError::DriverUnavailable(msg)
            | AppError::Internal(msg) => json!({
                "error": code,
                "message": msg,
            }),
            AppError::MalformedCallback | AppError::OrderReferenceMissing => json!({
                "error": code,
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
