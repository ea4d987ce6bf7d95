//! Lending calendar and fine policy.
//!
//! # Responsibility
//! - Compute loan due dates on business days.
//! - Compute late-return fines.
//!
//! # Invariants
//! - Functions are pure: output depends only on the given timestamps.
//! - A due date never falls on Saturday or Sunday (UTC calendar).
//! - Fines are zero unless the return is strictly after the due date.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Calendar days between lending and the unadjusted due date.
pub const LOAN_PERIOD_DAYS: i64 = 30;

/// Fine charged per whole day late.
pub const FINE_PER_DAY_LATE: Decimal = dec!(0.50);

/// Returns `loan_date + 30 days`, pushed to the following Monday when that
/// lands on a weekend. Time of day is preserved. Holidays are not considered.
pub fn compute_due_date(loan_date: DateTime<Utc>) -> DateTime<Utc> {
    let raw = loan_date + Duration::days(LOAN_PERIOD_DAYS);
    match raw.weekday() {
        Weekday::Sat => raw + Duration::days(2),
        Weekday::Sun => raw + Duration::days(1),
        _ => raw,
    }
}

/// Returns `days_late * 0.50`, where `days_late` counts whole elapsed days
/// from `due_date` to `return_date` (25 hours late is one day).
pub fn compute_fine(due_date: DateTime<Utc>, return_date: DateTime<Utc>) -> Decimal {
    if return_date <= due_date {
        return Decimal::ZERO;
    }

    let days_late = (return_date - due_date).num_days();
    Decimal::from(days_late) * FINE_PER_DAY_LATE
}
