//! API request handlers.

mod auth;
mod payroll;
mod teachers;

use axum::Json;
use serde::Serialize;

pub use auth::{admin_login, logout, me, student_login};
pub use payroll::{finalize_salary, get_payroll, grant_advance};
pub use teachers::{
    advance_history, create_teacher, get_teacher, list_teachers, salary_history, update_salary,
};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
