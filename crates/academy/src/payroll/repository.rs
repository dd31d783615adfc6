//! Payroll repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::models::{Advance, SalaryRecord, Teacher};

/// Repository for teachers, advances and salary records.
#[derive(Debug, Clone)]
pub struct PayrollRepository {
    pool: SqlitePool,
}

impl PayrollRepository {
    /// Create a new payroll repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Generate a new ID with a type prefix.
    pub fn generate_id(prefix: &str) -> String {
        format!("{}_{}", prefix, nanoid::nanoid!(12))
    }

    /// Insert a teacher.
    #[instrument(skip(self, teacher), fields(teacher_id = %teacher.id))]
    pub async fn create_teacher(&self, teacher: &Teacher) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO teachers (id, name, email, base_salary, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&teacher.id)
        .bind(&teacher.name)
        .bind(&teacher.email)
        .bind(teacher.base_salary)
        .bind(&teacher.created_at)
        .bind(&teacher.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert teacher")?;

        Ok(())
    }

    /// Get a teacher by ID.
    #[instrument(skip(self))]
    pub async fn get_teacher(&self, id: &str) -> Result<Option<Teacher>> {
        let teacher = sqlx::query_as::<_, Teacher>(
            r#"
            SELECT id, name, email, base_salary, created_at, updated_at
            FROM teachers
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch teacher")?;

        Ok(teacher)
    }

    /// List all teachers by name.
    #[instrument(skip(self))]
    pub async fn list_teachers(&self) -> Result<Vec<Teacher>> {
        let teachers = sqlx::query_as::<_, Teacher>(
            r#"
            SELECT id, name, email, base_salary, created_at, updated_at
            FROM teachers
            ORDER BY name COLLATE NOCASE, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list teachers")?;

        Ok(teachers)
    }

    /// Set a teacher's base salary. Returns false if the teacher does not exist.
    #[instrument(skip(self))]
    pub async fn update_base_salary(
        &self,
        id: &str,
        base_salary: i64,
        updated_at: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE teachers
            SET base_salary = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(base_salary)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update base salary")?;

        Ok(result.rows_affected() > 0)
    }

    /// Sum of a teacher's advances for one month.
    #[instrument(skip(self))]
    pub async fn month_total(&self, teacher_id: &str, month: &str) -> Result<i64> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM advances
            WHERE teacher_id = ? AND month = ?
            "#,
        )
        .bind(teacher_id)
        .bind(month)
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum advances")?;

        Ok(total)
    }

    /// A teacher's advances for one month, in insertion order.
    #[instrument(skip(self))]
    pub async fn advances_for_month(&self, teacher_id: &str, month: &str) -> Result<Vec<Advance>> {
        let advances = sqlx::query_as::<_, Advance>(
            r#"
            SELECT id, teacher_id, amount, reason, issued_by, month, created_at
            FROM advances
            WHERE teacher_id = ? AND month = ?
            ORDER BY rowid
            "#,
        )
        .bind(teacher_id)
        .bind(month)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch month advances")?;

        Ok(advances)
    }

    /// A teacher's full advance history, in insertion order.
    #[instrument(skip(self))]
    pub async fn advances(&self, teacher_id: &str) -> Result<Vec<Advance>> {
        let advances = sqlx::query_as::<_, Advance>(
            r#"
            SELECT id, teacher_id, amount, reason, issued_by, month, created_at
            FROM advances
            WHERE teacher_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch advance history")?;

        Ok(advances)
    }

    /// Append an advance only if the month total stays within base salary.
    ///
    /// Validation and insert happen in one statement, so the cap also holds
    /// against writers outside this process. Returns false when nothing was
    /// inserted (teacher missing or cap reached).
    #[instrument(skip(self, advance), fields(teacher_id = %advance.teacher_id, amount = advance.amount))]
    pub async fn try_append_advance(&self, advance: &Advance) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO advances (id, teacher_id, amount, reason, issued_by, month, created_at)
            SELECT ?, t.id, ?, ?, ?, ?, ?
            FROM teachers t
            WHERE t.id = ?
              AND (
                SELECT COALESCE(SUM(a.amount), 0)
                FROM advances a
                WHERE a.teacher_id = t.id AND a.month = ?
              ) + ? <= t.base_salary
            "#,
        )
        .bind(&advance.id)
        .bind(advance.amount)
        .bind(&advance.reason)
        .bind(&advance.issued_by)
        .bind(&advance.month)
        .bind(&advance.created_at)
        .bind(&advance.teacher_id)
        .bind(&advance.month)
        .bind(advance.amount)
        .execute(&self.pool)
        .await
        .context("Failed to append advance")?;

        let inserted = result.rows_affected() == 1;
        debug!(inserted, "Conditional advance insert");
        Ok(inserted)
    }

    /// Finalization for one month, if any.
    #[instrument(skip(self))]
    pub async fn salary_record(&self, teacher_id: &str, month: &str) -> Result<Option<SalaryRecord>> {
        let record = sqlx::query_as::<_, SalaryRecord>(
            r#"
            SELECT id, teacher_id, month, base_salary, total_advances, final_payment,
                   finalized_at, finalized_by
            FROM salary_records
            WHERE teacher_id = ? AND month = ?
            "#,
        )
        .bind(teacher_id)
        .bind(month)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch salary record")?;

        Ok(record)
    }

    /// All finalizations for a teacher, by month.
    #[instrument(skip(self))]
    pub async fn salary_records(&self, teacher_id: &str) -> Result<Vec<SalaryRecord>> {
        let records = sqlx::query_as::<_, SalaryRecord>(
            r#"
            SELECT id, teacher_id, month, base_salary, total_advances, final_payment,
                   finalized_at, finalized_by
            FROM salary_records
            WHERE teacher_id = ?
            ORDER BY month
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch salary history")?;

        Ok(records)
    }

    /// Insert a finalization. Returns false if the month was already finalized.
    #[instrument(skip(self, record), fields(teacher_id = %record.teacher_id, month = %record.month))]
    pub async fn insert_salary_record(&self, record: &SalaryRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO salary_records (
                id, teacher_id, month, base_salary, total_advances, final_payment,
                finalized_at, finalized_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.teacher_id)
        .bind(&record.month)
        .bind(record.base_salary)
        .bind(record.total_advances)
        .bind(record.final_payment)
        .bind(&record.finalized_at)
        .bind(&record.finalized_by)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e
                    .as_database_error()
                    .is_some_and(|db_err| db_err.is_unique_violation()) =>
            {
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert salary record"),
        }
    }
}
