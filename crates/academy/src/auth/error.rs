//! Authentication errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use super::Role;

/// Authentication errors.
///
/// The carried reasons are for logs only; responses stay generic so a caller
/// cannot tell a missing token from a bad signature.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential, or the credential's subject no longer exists.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Credential failed verification or decoding.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Valid credential issued for a different role.
    #[error("role {actual} cannot access {expected} routes")]
    Forbidden { expected: Role, actual: Role },

    /// Login with wrong email or password.
    #[error("invalid credentials")]
    InvalidLogin,

    /// Internal error.
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated(_)
            | AuthError::InvalidCredential(_)
            | AuthError::InvalidLogin => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(_) | AuthError::InvalidCredential(_) => "Not authorized",
            AuthError::Forbidden { .. } => "Access denied",
            AuthError::InvalidLogin => "Invalid email or password",
            AuthError::Internal(_) => "Server error",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub success: bool,
    pub message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Internal(_) => error!(reason = %self, "Authentication failed"),
            _ => warn!(reason = %self, "Authentication rejected"),
        }

        let body = Json(AuthErrorResponse {
            success: false,
            message: self.public_message(),
        });

        (self.status_code(), body).into_response()
    }
}
