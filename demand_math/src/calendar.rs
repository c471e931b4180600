//! ISO-week calendar arithmetic
//!
//! Periods are ISO weeks keyed by `(iso_year, iso_week)`. Using the ISO year
//! rather than the calendar year keeps the last week of one year and the first
//! week of the next distinct: 2024-12-30 belongs to `(2025, 1)` and so does
//! 2025-01-01, while 2024-12-27 is `(2024, 52)`.

use crate::{MathError, Result};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one weekly period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    /// ISO week-numbering year
    pub year: i32,
    /// ISO week number (1..=53)
    pub week: u32,
}

impl WeekKey {
    /// Bucket a date into its ISO week
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Monday that opens this week
    pub fn start(&self) -> Result<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).ok_or_else(|| {
            MathError::CalendarError(format!(
                "{}-W{:02} is not a valid ISO week",
                self.year, self.week
            ))
        })
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// Shift a date by whole weeks (negative moves backwards)
///
/// Fails instead of panicking when the result leaves chrono's date range.
pub fn add_weeks(date: NaiveDate, weeks: i64) -> Result<NaiveDate> {
    let shifted = weeks.unsigned_abs().checked_mul(7).and_then(|days| {
        if weeks >= 0 {
            date.checked_add_days(Days::new(days))
        } else {
            date.checked_sub_days(Days::new(days))
        }
    });
    shifted.ok_or_else(|| {
        MathError::CalendarError(format!("{} shifted by {} weeks is out of range", date, weeks))
    })
}

/// Whole weeks from `earlier` to `later`, rounded towards negative infinity
pub fn weeks_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days().div_euclid(7)
}

/// Calendar-derived model inputs for one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// Month of the period start (1..=12)
    pub month: u32,
    /// ISO week number of the period start
    pub week_of_year: u32,
    /// Whether the period start falls on a Saturday or Sunday
    pub is_weekend: bool,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            week_of_year: date.iso_week().week(),
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }

    /// Numeric encoding in model order: month, week of year, weekend flag
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.month as f64,
            self.week_of_year as f64,
            if self.is_weekend { 1.0 } else { 0.0 },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_year_boundary_weeks_do_not_collide() {
        let late_december = WeekKey::from_date(date(2024, 12, 27));
        let boundary = WeekKey::from_date(date(2024, 12, 30));
        let new_year = WeekKey::from_date(date(2025, 1, 1));
        let first_week_2024 = WeekKey::from_date(date(2024, 1, 3));

        assert_eq!(late_december, WeekKey { year: 2024, week: 52 });
        assert_eq!(boundary, new_year);
        assert_eq!(boundary, WeekKey { year: 2025, week: 1 });
        assert_ne!(boundary, first_week_2024);
        assert!(late_december < boundary);
    }

    #[test]
    fn test_week_start_is_monday() {
        let key = WeekKey::from_date(date(2022, 1, 1));
        // 2022-01-01 is a Saturday in ISO week 2021-W52
        assert_eq!(key, WeekKey { year: 2021, week: 52 });
        assert_eq!(key.start().unwrap(), date(2021, 12, 27));
    }

    #[test]
    fn test_invalid_week_is_rejected() {
        let key = WeekKey { year: 2023, week: 60 };
        assert!(key.start().is_err());
    }

    #[test]
    fn test_week_arithmetic() {
        let monday = date(2023, 1, 2);
        assert_eq!(add_weeks(monday, 2).unwrap(), date(2023, 1, 16));
        assert_eq!(add_weeks(monday, -1).unwrap(), date(2022, 12, 26));
        assert_eq!(weeks_between(monday, date(2023, 1, 16)), 2);
        assert_eq!(weeks_between(date(2023, 1, 16), monday), -2);
    }

    #[test]
    fn test_week_shift_out_of_range_is_an_error() {
        let monday = date(2023, 1, 2);
        assert!(matches!(
            add_weeks(monday, -1_000_000_000_000),
            Err(MathError::CalendarError(_))
        ));
        assert!(add_weeks(monday, i64::MAX).is_err());
        assert!(add_weeks(monday, i64::MIN).is_err());
    }

    #[test]
    fn test_calendar_features() {
        let features = CalendarFeatures::from_date(date(2023, 3, 6));
        assert_eq!(features.month, 3);
        assert_eq!(features.week_of_year, 10);
        assert!(!features.is_weekend);
        assert_eq!(features.to_vec(), vec![3.0, 10.0, 0.0]);

        assert!(CalendarFeatures::from_date(date(2023, 3, 5)).is_weekend);
    }
}
