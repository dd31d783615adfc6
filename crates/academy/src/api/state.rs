//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{AuthState, RoleGate};
use crate::payroll::PayrollService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Payroll ledger service.
    pub payroll: Arc<PayrollService>,
    /// Token signing and verification.
    pub auth: AuthState,
    /// Gate for admin-only routes; also verifies admin logins.
    pub admin_gate: RoleGate,
    /// Gate for student-only routes; also verifies student logins.
    pub student_gate: RoleGate,
    /// Include raw internal error detail in 500 responses.
    pub expose_error_details: bool,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        payroll: PayrollService,
        auth: AuthState,
        admin_gate: RoleGate,
        student_gate: RoleGate,
    ) -> Self {
        Self {
            payroll: Arc::new(payroll),
            auth,
            admin_gate,
            student_gate,
            expose_error_details: false,
        }
    }

    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }
}
