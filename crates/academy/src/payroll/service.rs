//! Payroll service for business logic.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::{info, instrument, warn};

use super::clock::{Clock, timestamp};
use super::error::{PayrollError, PayrollResult};
use super::ledger;
use super::locks::TeacherLocks;
use super::models::{
    Advance, AdvanceGranted, CreateTeacherRequest, FinalizationResult, PayrollSummary,
    SalaryRecord, Teacher, TeacherSummary,
};
use super::repository::PayrollRepository;

/// Default reason recorded on advances granted without one.
pub const DEFAULT_ADVANCE_REASON: &str = "Salary advance";

/// Conditional insert attempts before a grant is reported as a server error.
const MAX_GRANT_ATTEMPTS: usize = 3;

/// Service for the payroll ledger.
#[derive(Clone)]
pub struct PayrollService {
    repo: PayrollRepository,
    locks: TeacherLocks,
    clock: Arc<dyn Clock>,
    default_reason: String,
}

impl std::fmt::Debug for PayrollService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayrollService")
            .field("locks", &self.locks.len())
            .field("default_reason", &self.default_reason)
            .finish_non_exhaustive()
    }
}

impl PayrollService {
    /// Create a new payroll service.
    pub fn new(repo: PayrollRepository, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            locks: TeacherLocks::new(),
            clock,
            default_reason: DEFAULT_ADVANCE_REASON.to_string(),
        }
    }

    /// Override the reason recorded when a grant has none.
    pub fn with_default_reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if !reason.trim().is_empty() {
            self.default_reason = reason;
        }
        self
    }

    async fn require_teacher(&self, teacher_id: &str) -> PayrollResult<Teacher> {
        self.repo
            .get_teacher(teacher_id)
            .await?
            .ok_or_else(|| PayrollError::teacher_not_found(teacher_id))
    }

    /// Grant a salary advance against the current month.
    ///
    /// The month total after this call never exceeds the teacher's base
    /// salary, regardless of how many grants run concurrently.
    #[instrument(skip(self, reason), fields(month = tracing::field::Empty))]
    pub async fn grant_advance(
        &self,
        issuer_id: &str,
        teacher_id: &str,
        amount: i64,
        reason: Option<&str>,
    ) -> PayrollResult<AdvanceGranted> {
        let teacher_id = teacher_id.trim();
        if teacher_id.is_empty() {
            return Err(PayrollError::invalid("Teacher ID is required"));
        }
        if amount <= 0 {
            return Err(PayrollError::invalid("Amount must be a positive number"));
        }
        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r.to_string(),
            _ => self.default_reason.clone(),
        };

        // Unknown ids never reach the lock table.
        self.require_teacher(teacher_id).await?;
        let _guard = self.locks.lock(teacher_id).await;
        let now = self.clock.now();
        let month = ledger::month_key(now);
        tracing::Span::current().record("month", month.as_str());

        for attempt in 1..=MAX_GRANT_ATTEMPTS {
            let teacher = self.require_teacher(teacher_id).await?;
            let total = self.repo.month_total(teacher_id, &month).await?;
            if let Err(cap) = ledger::check_cap(teacher.base_salary, total, amount) {
                info!(
                    base_salary = cap.base_salary,
                    total_advances = cap.total_advances,
                    "Advance rejected by monthly cap"
                );
                return Err(cap.into());
            }

            let advance = Advance {
                id: PayrollRepository::generate_id("adv"),
                teacher_id: teacher.id.clone(),
                amount,
                reason: reason.clone(),
                issued_by: issuer_id.to_string(),
                month: month.clone(),
                created_at: timestamp(now),
            };

            if self.repo.try_append_advance(&advance).await? {
                let total = self.repo.month_total(teacher_id, &month).await?;
                info!(advance_id = %advance.id, "Granted advance");
                return Ok(AdvanceGranted {
                    id: teacher.id,
                    name: teacher.name,
                    base_salary: teacher.base_salary,
                    remaining_payable: ledger::remaining_payable(teacher.base_salary, total),
                    advance_granted: amount,
                    month,
                });
            }

            // Another writer changed the month total or the salary between our
            // read and the insert. Re-read and decide again.
            warn!(attempt, "Conditional advance insert lost a race, retrying");
        }

        Err(PayrollError::Internal(anyhow!(
            "advance for teacher {teacher_id} not committed after {MAX_GRANT_ATTEMPTS} attempts"
        )))
    }

    /// Month view of a teacher's payroll. Defaults to the current month.
    #[instrument(skip(self))]
    pub async fn get_payroll(
        &self,
        teacher_id: &str,
        month: Option<&str>,
    ) -> PayrollResult<PayrollSummary> {
        let month = match month.map(str::trim) {
            Some(m) if !m.is_empty() => {
                if !ledger::is_valid_month(m) {
                    return Err(PayrollError::invalid(format!(
                        "Invalid month '{m}', expected YYYY-MM"
                    )));
                }
                m.to_string()
            }
            _ => ledger::month_key(self.clock.now()),
        };

        let teacher = self.require_teacher(teacher_id).await?;
        let advances = self.repo.advances_for_month(teacher_id, &month).await?;
        let salary_finalized = self.repo.salary_record(teacher_id, &month).await?;

        let total_advances = ledger::total_advances(&advances);
        Ok(PayrollSummary {
            remaining_payable: ledger::remaining_payable(teacher.base_salary, total_advances),
            teacher: TeacherSummary::from(&teacher),
            month,
            advances,
            total_advances,
            salary_finalized,
        })
    }

    /// Finalize a teacher's salary for a month. At most once per month.
    #[instrument(skip(self))]
    pub async fn finalize_salary(
        &self,
        issuer_id: &str,
        teacher_id: &str,
        month: &str,
    ) -> PayrollResult<FinalizationResult> {
        let teacher_id = teacher_id.trim();
        let month = month.trim();
        if teacher_id.is_empty() || month.is_empty() {
            return Err(PayrollError::invalid("Teacher ID and month are required"));
        }
        if !ledger::is_valid_month(month) {
            return Err(PayrollError::invalid(format!(
                "Invalid month '{month}', expected YYYY-MM"
            )));
        }

        self.require_teacher(teacher_id).await?;
        let _guard = self.locks.lock(teacher_id).await;
        let teacher = self.require_teacher(teacher_id).await?;

        if self.repo.salary_record(teacher_id, month).await?.is_some() {
            return Err(PayrollError::AlreadyFinalized {
                month: month.to_string(),
            });
        }

        let total_advances = self.repo.month_total(teacher_id, month).await?;
        let record = SalaryRecord {
            id: PayrollRepository::generate_id("sal"),
            teacher_id: teacher.id.clone(),
            month: month.to_string(),
            base_salary: teacher.base_salary,
            total_advances,
            final_payment: ledger::final_payment(teacher.base_salary, total_advances),
            finalized_at: timestamp(self.clock.now()),
            finalized_by: issuer_id.to_string(),
        };

        if !self.repo.insert_salary_record(&record).await? {
            return Err(PayrollError::AlreadyFinalized {
                month: month.to_string(),
            });
        }

        info!(final_payment = record.final_payment, "Finalized salary");
        Ok(FinalizationResult::new(&teacher, &record))
    }

    /// Register a teacher.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_teacher(&self, request: CreateTeacherRequest) -> PayrollResult<Teacher> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(PayrollError::invalid("Name is required"));
        }
        if request.base_salary < 0 {
            return Err(PayrollError::invalid("Base salary cannot be negative"));
        }
        let email = request
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        if email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(PayrollError::invalid("Invalid email address"));
        }

        let now = timestamp(self.clock.now());
        let teacher = Teacher {
            id: PayrollRepository::generate_id("tch"),
            name: name.to_string(),
            email,
            base_salary: request.base_salary,
            created_at: now.clone(),
            updated_at: now,
        };
        self.repo.create_teacher(&teacher).await?;

        info!(teacher_id = %teacher.id, "Created teacher");
        Ok(teacher)
    }

    pub async fn list_teachers(&self) -> PayrollResult<Vec<Teacher>> {
        Ok(self.repo.list_teachers().await?)
    }

    pub async fn get_teacher(&self, teacher_id: &str) -> PayrollResult<Teacher> {
        self.require_teacher(teacher_id).await
    }

    /// Change a teacher's base salary. Advances already granted stay as they are.
    #[instrument(skip(self))]
    pub async fn update_base_salary(
        &self,
        teacher_id: &str,
        base_salary: i64,
    ) -> PayrollResult<Teacher> {
        if base_salary < 0 {
            return Err(PayrollError::invalid("Base salary cannot be negative"));
        }

        self.require_teacher(teacher_id).await?;
        let _guard = self.locks.lock(teacher_id).await;
        let now = timestamp(self.clock.now());
        if !self
            .repo
            .update_base_salary(teacher_id, base_salary, &now)
            .await?
        {
            return Err(PayrollError::teacher_not_found(teacher_id));
        }

        info!("Updated base salary");
        self.require_teacher(teacher_id).await
    }

    /// Every advance ever granted to a teacher, oldest first.
    pub async fn advance_history(&self, teacher_id: &str) -> PayrollResult<Vec<Advance>> {
        self.require_teacher(teacher_id).await?;
        Ok(self.repo.advances(teacher_id).await?)
    }

    /// Every finalized month for a teacher, by month.
    pub async fn salary_history(&self, teacher_id: &str) -> PayrollResult<Vec<SalaryRecord>> {
        self.require_teacher(teacher_id).await?;
        Ok(self.repo.salary_records(teacher_id).await?)
    }
}
