//! Advance, payroll and finalization handlers.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::CurrentPrincipal;
use crate::payroll::{AdvanceGranted, FinalizationResult, PayrollSummary};

/// Request body for `POST /advance`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAdvanceRequest {
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GrantAdvanceResponse {
    pub success: bool,
    pub message: String,
    pub teacher: AdvanceGranted,
}

/// Grant a salary advance for the current month.
#[instrument(skip(state, admin, payload))]
pub async fn grant_advance(
    State(state): State<AppState>,
    CurrentPrincipal(admin): CurrentPrincipal,
    payload: Result<Json<GrantAdvanceRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GrantAdvanceResponse>)> {
    let Json(request) = payload?;
    let (Some(teacher_id), Some(amount)) = (request.teacher_id, request.amount) else {
        return Err(ApiError::invalid_request("Teacher ID and amount are required"));
    };

    let granted = state
        .payroll
        .grant_advance(&admin.id, &teacher_id, amount, request.reason.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(GrantAdvanceResponse {
            success: true,
            message: format!("Advance of {} granted to {}", amount, granted.name),
            teacher: granted,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PayrollQuery {
    pub month: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayrollResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub summary: PayrollSummary,
}

/// Month payroll summary for a teacher.
#[instrument(skip(state, _admin))]
pub async fn get_payroll(
    State(state): State<AppState>,
    CurrentPrincipal(_admin): CurrentPrincipal,
    Path(teacher_id): Path<String>,
    Query(query): Query<PayrollQuery>,
) -> ApiResult<Json<PayrollResponse>> {
    let summary = state
        .payroll
        .get_payroll(&teacher_id, query.month.as_deref())
        .await?;

    Ok(Json(PayrollResponse {
        success: true,
        message: format!("Payroll for {} in {}", summary.teacher.name, summary.month),
        summary,
    }))
}

/// Request body for `POST /finalize`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub success: bool,
    pub message: String,
    pub salary: FinalizationResult,
}

/// Finalize a teacher's salary for a month.
#[instrument(skip(state, admin, payload))]
pub async fn finalize_salary(
    State(state): State<AppState>,
    CurrentPrincipal(admin): CurrentPrincipal,
    payload: Result<Json<FinalizeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FinalizeResponse>)> {
    let Json(request) = payload?;
    let (Some(teacher_id), Some(month)) = (request.teacher_id, request.month) else {
        return Err(ApiError::invalid_request("Teacher ID and month are required"));
    };

    let salary = state
        .payroll
        .finalize_salary(&admin.id, &teacher_id, &month)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(FinalizeResponse {
            success: true,
            message: format!("Salary for {} finalized", salary.month),
            salary,
        }),
    ))
}
