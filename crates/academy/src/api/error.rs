//! Unified API error handling with structured responses.

use axum::{
    Json,
    extract::{Request, rejection::JsonRejection},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::AuthError;
use crate::payroll::{CapExceeded, PayrollError};

/// Message returned for every unexpected failure.
const SERVER_ERROR_MESSAGE: &str = "Server error";

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Advance exceeds remaining payable salary")]
    CapExceeded(CapExceeded),

    #[error("Salary for {0} has already been finalized")]
    AlreadyFinalized(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::CapExceeded(_) | Self::AlreadyFinalized(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub cap: Option<CapExceeded>,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: None,
            cap: None,
        }
    }
}

/// Detail of an internal failure, attached to the response for
/// [`expose_error_details`] to pick up.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            ApiError::Internal(detail) => {
                error!(error = %detail, "API error");
                let mut response =
                    (status, Json(ErrorResponse::new(SERVER_ERROR_MESSAGE))).into_response();
                response.extensions_mut().insert(InternalErrorDetail(detail));
                response
            }
            ApiError::CapExceeded(cap) => {
                let message = format!(
                    "Advance of {} exceeds remaining payable salary of {}",
                    cap.requested_amount, cap.remaining_payable
                );
                debug!(message = %message, "Client error");
                let body = ErrorResponse {
                    cap: Some(cap),
                    ..ErrorResponse::new(message)
                };
                (status, Json(body)).into_response()
            }
            other => {
                let message = other.to_string();
                debug!(status = status.as_u16(), message = %message, "Client error");
                (status, Json(ErrorResponse::new(message))).into_response()
            }
        }
    }
}

/// Middleware that adds the raw detail of internal errors to the response
/// body under `error`. Only installed when explicitly enabled.
pub async fn expose_error_details(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    match response.extensions().get::<InternalErrorDetail>().cloned() {
        Some(InternalErrorDetail(detail)) => {
            let body = ErrorResponse {
                error: Some(detail),
                ..ErrorResponse::new(SERVER_ERROR_MESSAGE)
            };
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}

impl From<PayrollError> for ApiError {
    fn from(err: PayrollError) -> Self {
        match err {
            PayrollError::InvalidRequest(msg) => ApiError::InvalidRequest(msg),
            PayrollError::NotFound(msg) => ApiError::NotFound(msg),
            PayrollError::CapExceeded(cap) => ApiError::CapExceeded(cap),
            PayrollError::AlreadyFinalized { month } => ApiError::AlreadyFinalized(month),
            PayrollError::Internal(e) => ApiError::Internal(format!("{e:#}")),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(_) | AuthError::InvalidCredential(_) => {
                ApiError::Unauthenticated("Not authorized".to_string())
            }
            AuthError::InvalidLogin => {
                ApiError::Unauthenticated("Invalid email or password".to_string())
            }
            AuthError::Forbidden { .. } => ApiError::Forbidden("Access denied".to_string()),
            AuthError::Internal(msg) => ApiError::Internal(format!("Authentication error: {msg}")),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

/// Malformed or mistyped JSON is a client error, not axum's default 422.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
