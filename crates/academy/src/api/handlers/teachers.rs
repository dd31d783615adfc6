//! Teacher registry handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::auth::CurrentPrincipal;
use crate::payroll::{Advance, CreateTeacherRequest, SalaryRecord, Teacher};

#[derive(Debug, Serialize)]
pub struct TeacherResponse {
    pub success: bool,
    pub message: String,
    pub teacher: Teacher,
}

#[derive(Debug, Serialize)]
pub struct TeacherListResponse {
    pub success: bool,
    pub message: String,
    pub teachers: Vec<Teacher>,
}

/// List all teachers.
#[instrument(skip(state, _admin))]
pub async fn list_teachers(
    State(state): State<AppState>,
    CurrentPrincipal(_admin): CurrentPrincipal,
) -> ApiResult<Json<TeacherListResponse>> {
    let teachers = state.payroll.list_teachers().await?;
    Ok(Json(TeacherListResponse {
        success: true,
        message: format!("{} teacher(s)", teachers.len()),
        teachers,
    }))
}

/// Register a teacher.
#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn create_teacher(
    State(state): State<AppState>,
    CurrentPrincipal(admin): CurrentPrincipal,
    payload: Result<Json<CreateTeacherRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TeacherResponse>)> {
    let Json(request) = payload?;
    let teacher = state.payroll.create_teacher(request).await?;

    info!(teacher_id = %teacher.id, "Teacher registered");
    Ok((
        StatusCode::CREATED,
        Json(TeacherResponse {
            success: true,
            message: "Teacher created".to_string(),
            teacher,
        }),
    ))
}

/// Get a teacher by ID.
#[instrument(skip(state, _admin))]
pub async fn get_teacher(
    State(state): State<AppState>,
    CurrentPrincipal(_admin): CurrentPrincipal,
    Path(teacher_id): Path<String>,
) -> ApiResult<Json<TeacherResponse>> {
    let teacher = state.payroll.get_teacher(&teacher_id).await?;
    Ok(Json(TeacherResponse {
        success: true,
        message: "Teacher found".to_string(),
        teacher,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSalaryRequest {
    pub base_salary: i64,
}

/// Change a teacher's base salary.
#[instrument(skip(state, _admin, payload))]
pub async fn update_salary(
    State(state): State<AppState>,
    CurrentPrincipal(_admin): CurrentPrincipal,
    Path(teacher_id): Path<String>,
    payload: Result<Json<UpdateSalaryRequest>, JsonRejection>,
) -> ApiResult<Json<TeacherResponse>> {
    let Json(request) = payload?;
    let teacher = state
        .payroll
        .update_base_salary(&teacher_id, request.base_salary)
        .await?;

    Ok(Json(TeacherResponse {
        success: true,
        message: "Base salary updated".to_string(),
        teacher,
    }))
}

#[derive(Debug, Serialize)]
pub struct AdvanceHistoryResponse {
    pub success: bool,
    pub message: String,
    pub advances: Vec<Advance>,
}

/// Full advance history for a teacher.
#[instrument(skip(state, _admin))]
pub async fn advance_history(
    State(state): State<AppState>,
    CurrentPrincipal(_admin): CurrentPrincipal,
    Path(teacher_id): Path<String>,
) -> ApiResult<Json<AdvanceHistoryResponse>> {
    let advances = state.payroll.advance_history(&teacher_id).await?;
    Ok(Json(AdvanceHistoryResponse {
        success: true,
        message: format!("{} advance(s)", advances.len()),
        advances,
    }))
}

#[derive(Debug, Serialize)]
pub struct SalaryHistoryResponse {
    pub success: bool,
    pub message: String,
    pub salaries: Vec<SalaryRecord>,
}

/// All finalized months for a teacher.
#[instrument(skip(state, _admin))]
pub async fn salary_history(
    State(state): State<AppState>,
    CurrentPrincipal(_admin): CurrentPrincipal,
    Path(teacher_id): Path<String>,
) -> ApiResult<Json<SalaryHistoryResponse>> {
    let salaries = state.payroll.salary_history(&teacher_id).await?;
    Ok(Json(SalaryHistoryResponse {
        success: true,
        message: format!("{} finalized month(s)", salaries.len()),
        salaries,
    }))
}
