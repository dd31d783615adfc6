//! Payroll errors.

use serde::Serialize;
use thiserror::Error;

/// Explanation attached to a rejected advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapExceeded {
    pub base_salary: i64,
    /// Month total before the rejected grant.
    pub total_advances: i64,
    pub remaining_payable: i64,
    pub requested_amount: i64,
}

/// Errors returned by payroll operations.
#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Advance exceeds remaining payable salary")]
    CapExceeded(CapExceeded),

    #[error("Salary for {month} has already been finalized")]
    AlreadyFinalized { month: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PayrollError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn teacher_not_found(id: &str) -> Self {
        Self::NotFound(format!("Teacher not found: {id}"))
    }
}

impl From<CapExceeded> for PayrollError {
    fn from(cap: CapExceeded) -> Self {
        Self::CapExceeded(cap)
    }
}

/// Result type for payroll operations.
pub type PayrollResult<T> = Result<T, PayrollError>;
