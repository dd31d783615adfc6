//! Pure ledger arithmetic: period keys, month sums, cap check, final payment.
//!
//! Nothing here touches storage; the service composes these with the repository.

use chrono::{DateTime, Utc};

use super::error::CapExceeded;
use super::models::Advance;

/// Period key (`YYYY-MM`) of a UTC instant.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Check that `month` is a `YYYY-MM` period key with a month of 01-12.
pub fn is_valid_month(month: &str) -> bool {
    let bytes = month.as_bytes();
    if bytes.len() != 7 || bytes[4] != b'-' {
        return false;
    }
    if !bytes[..4].iter().chain(&bytes[5..]).all(u8::is_ascii_digit) {
        return false;
    }
    matches!(month[5..].parse::<u8>(), Ok(1..=12))
}

/// Sum of advance amounts.
pub fn total_advances<'a>(advances: impl IntoIterator<Item = &'a Advance>) -> i64 {
    advances
        .into_iter()
        .fold(0_i64, |acc, a| acc.saturating_add(a.amount))
}

/// Salary still payable for a month. Negative when base salary was lowered
/// below what had already been advanced.
pub fn remaining_payable(base_salary: i64, total_advances: i64) -> i64 {
    base_salary.saturating_sub(total_advances)
}

/// Amount paid out on finalization, clamped at zero.
pub fn final_payment(base_salary: i64, total_advances: i64) -> i64 {
    remaining_payable(base_salary, total_advances).max(0)
}

/// Reject a grant that would push the month total above base salary.
pub fn check_cap(base_salary: i64, total_advances: i64, requested: i64) -> Result<(), CapExceeded> {
    if total_advances.saturating_add(requested) > base_salary {
        return Err(CapExceeded {
            base_salary,
            total_advances,
            remaining_payable: remaining_payable(base_salary, total_advances),
            requested_amount: requested,
        });
    }
    Ok(())
}
