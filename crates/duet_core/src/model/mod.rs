//! Domain model for shared spaces and their dependent records.
//!
//! # Responsibility
//! - Define canonical data structures used by the lifecycle services.
//! - Keep field validation next to the types it protects.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Timestamps are Unix epoch milliseconds.

pub mod journal;
pub mod notification;
pub mod session;
pub mod space;
pub mod unbind;
pub mod user;

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static CALENDAR_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})$").expect("valid calendar date regex")
});

/// Field-level validation failure for model input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Calendar date is not a real `YYYY-MM-DD` date.
    InvalidDate(String),
    /// Invite code does not match `[A-Z0-9]{6}`.
    InvalidInviteCode(String),
    /// Required text field is blank after trim.
    BlankField(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDate(value) => write!(f, "invalid calendar date `{value}`"),
            Self::InvalidInviteCode(value) => write!(f, "invalid invite code `{value}`"),
            Self::BlankField(field) => write!(f, "{field} must not be blank"),
        }
    }
}

impl Error for ValidationError {}

/// Validates a `YYYY-MM-DD` calendar date, including month lengths.
pub fn validate_calendar_date(value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidDate(value.to_string());
    let captures = CALENDAR_DATE_RE.captures(value).ok_or_else(invalid)?;

    let year: u32 = captures[1].parse().map_err(|_| invalid())?;
    let month: u32 = captures[2].parse().map_err(|_| invalid())?;
    let day: u32 = captures[3].parse().map_err(|_| invalid())?;

    let days_in_month = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => return Err(invalid()),
    };
    if day == 0 || day > days_in_month {
        return Err(invalid());
    }

    Ok(())
}

/// Trims a required text field and rejects blank input.
pub fn normalize_required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(trimmed.to_string())
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::{normalize_required, validate_calendar_date, ValidationError};

    #[test]
    fn accepts_real_dates() {
        validate_calendar_date("2024-02-14").unwrap();
        validate_calendar_date("2024-02-29").unwrap();
        validate_calendar_date("1999-12-31").unwrap();
    }

    #[test]
    fn rejects_impossible_or_malformed_dates() {
        let rejected = [
            "2023-02-29",
            "2024-13-01",
            "2024-04-31",
            "2024-1-01",
            "24-02-14x",
            "2024/02/14",
            "+024-02-14",
        ];
        for value in rejected {
            assert!(
                matches!(validate_calendar_date(value), Err(ValidationError::InvalidDate(_))),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn normalize_required_trims_and_rejects_blank() {
        assert_eq!(normalize_required("title", "  hi ").unwrap(), "hi");
        assert_eq!(
            normalize_required("title", "   ").unwrap_err(),
            ValidationError::BlankField("title")
        );
    }
}
