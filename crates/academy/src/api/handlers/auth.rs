//! Login, logout and identity handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::{
    ADMIN_COOKIE, ADMIN_COOKIE_LEGACY, AuthError, CurrentPrincipal, Principal, RoleGate,
    STUDENT_COOKIE,
};

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: Principal,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub message: String,
    pub user: Principal,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

fn session_cookie(name: &str, token: &str, max_age: i64, dev_mode: bool) -> String {
    let secure_flag = if dev_mode { "" } else { " Secure;" };
    format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax;{secure_flag} Max-Age={max_age}")
}

fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

async fn login_with(
    state: &AppState,
    gate: &RoleGate,
    cookie_name: &str,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(AppendHeaders<[(HeaderName, String); 1]>, Json<LoginResponse>)> {
    let Json(request) = payload?;
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::invalid_request("Email and password are required"));
    }

    let principal = gate
        .store()
        .verify_login(&request.email, &request.password)
        .await?
        .ok_or_else(|| {
            warn!(role = %gate.role(), "Login rejected");
            AuthError::InvalidLogin
        })?;

    let token = state.auth.issue_token(&principal)?;
    let cookie = session_cookie(
        cookie_name,
        &token,
        state.auth.token_ttl_secs(),
        state.auth.is_dev_mode(),
    );

    info!(principal_id = %principal.id, role = %principal.role, "Logged in");
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            token,
            user: principal,
        }),
    ))
}

/// Admin login.
#[instrument(skip(state, payload))]
pub async fn admin_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    login_with(&state, &state.admin_gate, ADMIN_COOKIE, payload).await
}

/// Student login.
#[instrument(skip(state, payload))]
pub async fn student_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    login_with(&state, &state.student_gate, STUDENT_COOKIE, payload).await
}

/// Clear every credential cookie.
pub async fn logout() -> impl IntoResponse {
    let cookies = [ADMIN_COOKIE, ADMIN_COOKIE_LEGACY, STUDENT_COOKIE]
        .map(|name| (SET_COOKIE, expired_cookie(name)));

    (
        StatusCode::OK,
        AppendHeaders(cookies),
        Json(LogoutResponse {
            success: true,
            message: "Logged out".to_string(),
        }),
    )
}

/// Identity behind the current credential.
pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        message: format!("Authenticated as {}", principal.role),
        user: principal,
    })
}
