//! Deadline parsing for command-line input.
//!
//! Supports:
//! - "today", "tomorrow"
//! - "monday".."sunday" (and three-letter forms), "next friday"
//! - "end of week" / "eow", "end of month" / "eom"
//! - "in 3d", "in 2w"
//! - "YYYY-MM-DD"

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{Result, TrackerError};

const WEEKDAYS: [(&str, &str); 7] = [
    ("monday", "mon"),
    ("tuesday", "tue"),
    ("wednesday", "wed"),
    ("thursday", "thu"),
    ("friday", "fri"),
    ("saturday", "sat"),
    ("sunday", "sun"),
];

/// Parse a deadline relative to `today`.
pub fn parse_due_input(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    let s = s.trim().to_lowercase();
    parse_relative(&s, today)
        .or_else(|| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            TrackerError::validation(format!(
                "unrecognised deadline '{s}'; use YYYY-MM-DD, 'today', 'tomorrow', a weekday, or 'in Nd'"
            ))
        })
}

fn parse_relative(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    match s {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "end of week" | "eow" => return Some(end_of_week(today)),
        "end of month" | "eom" => return end_of_month(today),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        let offset = if let Some(n) = rest.strip_suffix('d') {
            Duration::try_days(n.trim().parse().ok()?)
        } else if let Some(n) = rest.strip_suffix('w') {
            Duration::try_weeks(n.trim().parse().ok()?)
        } else {
            None
        };
        // Out-of-range offsets are rejected, not wrapped.
        return today.checked_add_signed(offset?);
    }

    let (day, skip_week) = match s.strip_prefix("next ") {
        Some(day) => (day, true),
        None => (s, false),
    };
    let target = WEEKDAYS
        .iter()
        .position(|(long, short)| day == *long || day == *short)? as i64;
    let current = i64::from(today.weekday().num_days_from_monday());
    let ahead = (target - current).rem_euclid(7);
    let ahead = if skip_week { ahead + 7 } else { ahead };
    Some(today + Duration::days(ahead))
}

/// Sunday of the current ISO week.
fn end_of_week(today: NaiveDate) -> NaiveDate {
    let weekday = i64::from(today.weekday().num_days_from_monday());
    today + Duration::days(6 - weekday)
}

fn end_of_month(today: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d - Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-05-08 is a Wednesday.
    fn wed() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 8).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_keywords_and_offsets() {
        assert_eq!(parse_due_input("Today", wed()).unwrap(), wed());
        assert_eq!(parse_due_input("tomorrow", wed()).unwrap(), ymd(2024, 5, 9));
        assert_eq!(parse_due_input("in 3d", wed()).unwrap(), ymd(2024, 5, 11));
        assert_eq!(parse_due_input("in 2w", wed()).unwrap(), ymd(2024, 5, 22));
        assert_eq!(parse_due_input("eow", wed()).unwrap(), ymd(2024, 5, 12));
        assert_eq!(parse_due_input("end of month", wed()).unwrap(), ymd(2024, 5, 31));
        assert_eq!(parse_due_input("eom", ymd(2024, 12, 3)).unwrap(), ymd(2024, 12, 31));
    }

    #[test]
    fn test_weekdays() {
        assert_eq!(parse_due_input("wed", wed()).unwrap(), wed());
        assert_eq!(parse_due_input("friday", wed()).unwrap(), ymd(2024, 5, 10));
        assert_eq!(parse_due_input("monday", wed()).unwrap(), ymd(2024, 5, 13));
        assert_eq!(parse_due_input("next friday", wed()).unwrap(), ymd(2024, 5, 17));
    }

    #[test]
    fn test_iso_and_garbage() {
        assert_eq!(parse_due_input("2025-01-31", wed()).unwrap(), ymd(2025, 1, 31));
        assert!(matches!(parse_due_input("someday", wed()), Err(TrackerError::Validation(_))));
        assert!(matches!(parse_due_input("in xd", wed()), Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_huge_offsets_are_validation_errors() {
        for input in ["in 100000000d", "in 99999999999w", "in 9223372036854775807d", "in -100000000d"] {
            assert!(
                matches!(parse_due_input(input, wed()), Err(TrackerError::Validation(_))),
                "{input} should be rejected"
            );
        }
        assert_eq!(parse_due_input("in -2d", wed()).unwrap(), ymd(2024, 5, 6));
    }
}
