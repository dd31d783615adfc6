//! Payroll ledger.
//!
//! Teachers, append-only salary advances under a monthly cap, and
//! at-most-once monthly salary finalization.

mod clock;
mod error;
pub mod ledger;
mod locks;
mod models;
mod repository;
mod service;

pub use clock::{Clock, FixedClock, SystemClock, timestamp};
pub use error::{CapExceeded, PayrollError, PayrollResult};
pub use locks::{TeacherLockGuard, TeacherLocks};
pub use models::{
    Advance, AdvanceGranted, CreateTeacherRequest, FinalizationResult, PayrollSummary,
    SalaryRecord, Teacher, TeacherSummary,
};
pub use repository::PayrollRepository;
pub use service::{DEFAULT_ADVANCE_REASON, PayrollService};
