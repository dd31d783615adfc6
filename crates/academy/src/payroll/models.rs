//! Payroll data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Teacher (employee) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    /// Monthly base salary in whole currency units.
    pub base_salary: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Salary advance. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Advance {
    pub id: String,
    pub teacher_id: String,
    pub amount: i64,
    pub reason: String,
    /// Principal that authorized the advance.
    pub issued_by: String,
    /// Period key derived from `created_at` at grant time.
    pub month: String,
    pub created_at: String,
}

/// Finalized monthly salary. At most one per (teacher, month).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SalaryRecord {
    pub id: String,
    pub teacher_id: String,
    pub month: String,
    pub base_salary: i64,
    pub total_advances: i64,
    pub final_payment: i64,
    pub finalized_at: String,
    pub finalized_by: String,
}

/// Request to register a teacher.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeacherRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub base_salary: i64,
}

/// Teacher identity echoed in payroll responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSummary {
    pub id: String,
    pub name: String,
    pub base_salary: i64,
}

impl From<&Teacher> for TeacherSummary {
    fn from(teacher: &Teacher) -> Self {
        Self {
            id: teacher.id.clone(),
            name: teacher.name.clone(),
            base_salary: teacher.base_salary,
        }
    }
}

/// Outcome of a granted advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceGranted {
    pub id: String,
    pub name: String,
    pub base_salary: i64,
    /// Recomputed after commit.
    pub remaining_payable: i64,
    pub advance_granted: i64,
    pub month: String,
}

/// Month view of a teacher's payroll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollSummary {
    pub teacher: TeacherSummary,
    pub month: String,
    pub advances: Vec<Advance>,
    pub total_advances: i64,
    pub remaining_payable: i64,
    pub salary_finalized: Option<SalaryRecord>,
}

/// Outcome of a salary finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationResult {
    pub teacher_id: String,
    pub teacher_name: String,
    pub month: String,
    pub base_salary: i64,
    pub total_advances: i64,
    pub final_payment: i64,
}

impl FinalizationResult {
    pub fn new(teacher: &Teacher, record: &SalaryRecord) -> Self {
        Self {
            teacher_id: teacher.id.clone(),
            teacher_name: teacher.name.clone(),
            month: record.month.clone(),
            base_salary: record.base_salary,
            total_advances: record.total_advances,
            final_payment: record.final_payment,
        }
    }
}
