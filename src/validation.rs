use chrono::NaiveDate;

use crate::error::AppError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Longest planning horizon accepted anywhere (100 years).
pub const MAX_HORIZON_MONTHS: u32 = 1200;

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub fn require_valid_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must be a valid ID")));
    }
    Ok(())
}

/// Amounts are integer minor units and never negative.
pub fn require_non_negative_amount(field: &str, value: i64) -> Result<(), AppError> {
    if value < 0 {
        return Err(AppError::Validation(format!(
            "{field} must be a non-negative amount in minor units, got {value}"
        )));
    }
    Ok(())
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    // chrono accepts unpadded fields, so enforce the exact shape first.
    let shaped = value.len() == 10
        && value
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !shaped {
        return Err(AppError::Validation(format!(
            "{field} must be a YYYY-MM-DD date, got '{value}'"
        )));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        AppError::Validation(format!("{field} is not a valid calendar date: '{value}'"))
    })
}

pub fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    value.map(|v| parse_date(field, v)).transpose()
}

/// Parse a date that was validated on write. Failure means the row is corrupt.
pub fn stored_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| AppError::Integrity(format!("stored {field} '{value}' is not a valid date")))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn require_range(field: &str, value: i64, min: i64, max: i64) -> Result<(), AppError> {
    if value < min || value > max {
        return Err(AppError::Validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

pub fn require_horizon_months(field: &str, value: u32) -> Result<(), AppError> {
    require_range(field, i64::from(value), 1, i64::from(MAX_HORIZON_MONTHS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_iso() {
        let d = parse_date("date", "2026-02-28").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        assert_eq!(format_date(d), "2026-02-28");
    }

    #[test]
    fn test_parse_date_rejects_bad_shapes() {
        for bad in ["2026-2-28", "2026/02/28", "", "2026-02-30", "26-02-28x", "2026-02-28T00:00:00Z"] {
            let err = parse_date("date", bad).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "accepted {bad}");
        }
    }

    #[test]
    fn test_stored_date_failure_is_integrity() {
        assert!(matches!(stored_date("occurrence_date", "nope"), Err(AppError::Integrity(_))));
    }

    #[test]
    fn test_amount_and_range_checks() {
        assert!(require_non_negative_amount("amount", 0).is_ok());
        assert!(require_non_negative_amount("amount", -1).is_err());
        assert!(require_range("day_of_month", 31, 1, 31).is_ok());
        assert!(require_range("day_of_month", 32, 1, 31).is_err());
        assert!(require_non_empty("name", "  ").is_err());
        assert!(require_valid_id("scenario_id", "s-1").is_ok());
        assert!(require_horizon_months("horizon_months", MAX_HORIZON_MONTHS).is_ok());
        assert!(require_horizon_months("horizon_months", 0).is_err());
        assert!(require_horizon_months("horizon_months", u32::MAX).is_err());
    }
}
