//! Month-aware date stepping with end-of-month clamping.

use chrono::{Datelike, NaiveDate};

use crate::db::models::Frequency;

/// Number of days in `month` (1-12) of `year`.
pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if NaiveDate::from_ymd_opt(year, 2, 29).is_some() => 29,
        2 => 28,
        _ => 31,
    }
}

/// Shift `date` by `months` calendar months and land on `target_day`,
/// clamped to the last day of the resulting month (day 31 in February
/// becomes the 28th or 29th).
///
/// Returns `None` only when the result leaves chrono's representable range.
pub fn add_months_clamped(date: NaiveDate, months: i32, target_day: u32) -> Option<NaiveDate> {
    let index = date.year().checked_mul(12)?.checked_add(date.month0() as i32)?.checked_add(months)?;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    let day = target_day.clamp(1, last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn compute_step_in_months(frequency: Frequency, interval: u32) -> u32 {
    match frequency {
        Frequency::Monthly => interval,
        Frequency::Quarterly => interval.saturating_mul(3),
        Frequency::Yearly => interval.saturating_mul(12),
    }
}

/// `YYYY-MM` bucket for a date.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let last = last_day_of_month(date.year(), date.month());
    (
        date.with_day(1).unwrap_or(date),
        date.with_day(last).unwrap_or(date),
    )
}
