use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Absolute number of calendar days between two dates.
pub fn day_offset(a: NaiveDate, b: NaiveDate) -> u32 {
    (a - b).num_days().unsigned_abs() as u32
}

/// Symmetric tolerance around a reference date, in calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateWindow {
    pub days: u32,
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-day", self.days)
    }
}

impl DateWindow {
    pub fn days(days: u32) -> Self {
        DateWindow { days }
    }

    pub fn contains(self, reference: NaiveDate, date: NaiveDate) -> bool {
        day_offset(reference, date) <= self.days
    }

    pub fn around(self, reference: NaiveDate) -> DateRange {
        let span = chrono::Days::new(u64::from(self.days));
        DateRange::new(
            reference.checked_sub_days(span).unwrap_or(NaiveDate::MIN),
            reference.checked_add_days(span).unwrap_or(NaiveDate::MAX),
        )
    }
}
