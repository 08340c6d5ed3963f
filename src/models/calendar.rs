//! Calendar and date window models.
//!
//! Defines day-granular availability: which weekdays are worked and
//! which date ranges are blocked (holidays, shutdowns). Calendars are
//! shared by reference between orders and task elements; the engine
//! never owns them, it resolves a full definition through the
//! [`CalendarResolver`](crate::stores::CalendarResolver) collaborator.
//!
//! # Precedence
//! Blocked windows override working weekdays. A day is available iff
//! its weekday is in `working_days` AND it does not fall inside any
//! `blocked` window.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A date interval [start, end).
///
/// Half-open: includes `start`, excludes `end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    /// First day (inclusive).
    pub start: NaiveDate,
    /// Day after the last day (exclusive).
    pub end: NaiveDate,
}

impl DateWindow {
    /// Creates a new date window.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of days covered.
    #[inline]
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Whether a day falls within this window.
    #[inline]
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day < self.end
    }

    /// Whether two windows overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A resource or order availability calendar.
///
/// With no blocked windows and the default weekday set (Mon-Fri),
/// a calendar behaves like a plain business-day calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    /// Calendar identifier.
    pub id: String,
    /// Weekdays that are worked.
    pub working_days: Vec<Weekday>,
    /// Date ranges when no work happens (override working weekdays).
    pub blocked: Vec<DateWindow>,
}

impl Calendar {
    /// Creates a Monday-to-Friday calendar.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            blocked: Vec::new(),
        }
    }

    /// Creates a calendar worked every day of the week.
    pub fn seven_days(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
            blocked: Vec::new(),
        }
    }

    /// Replaces the worked weekday set.
    pub fn with_working_days(mut self, days: Vec<Weekday>) -> Self {
        self.working_days = days;
        self
    }

    /// Adds a blocked date range [start, end).
    pub fn with_blocked(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.blocked.push(DateWindow::new(start, end));
        self
    }

    /// Whether a day is worked.
    pub fn is_working_day(&self, day: NaiveDate) -> bool {
        if self.blocked.iter().any(|w| w.contains(day)) {
            return false;
        }
        self.working_days.contains(&day.weekday())
    }

    /// Finds the next working day at or after `from`.
    ///
    /// Returns `None` if no working day exists within a one-year scan,
    /// which only happens for a calendar with no worked weekdays or a
    /// blocked window longer than a year.
    pub fn next_working_day(&self, from: NaiveDate) -> Option<NaiveDate> {
        let mut day = from;
        for _ in 0..366 {
            if self.is_working_day(day) {
                return Some(day);
            }
            day = day.checked_add_days(Days::new(1))?;
        }
        None
    }

    /// Counts working days within [start, end).
    pub fn working_days_in_range(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        if end <= start {
            return 0;
        }
        let mut count = 0;
        let mut day = start;
        while day < end {
            if self.is_working_day(day) {
                count += 1;
            }
            match day.checked_add_days(Days::new(1)) {
                Some(next) => day = next,
                None => break,
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_window() {
        let w = DateWindow::new(d(2024, 1, 1), d(2024, 1, 11));
        assert_eq!(w.duration_days(), 10);
        assert!(w.contains(d(2024, 1, 1)));
        assert!(w.contains(d(2024, 1, 10)));
        assert!(!w.contains(d(2024, 1, 11))); // exclusive end
        assert!(!w.contains(d(2023, 12, 31)));
    }

    #[test]
    fn test_date_window_overlap() {
        let a = DateWindow::new(d(2024, 1, 1), d(2024, 1, 10));
        let b = DateWindow::new(d(2024, 1, 5), d(2024, 1, 15));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));

        let c = DateWindow::new(d(2024, 1, 10), d(2024, 1, 20)); // touching
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_business_days() {
        let cal = Calendar::new("std");
        assert!(cal.is_working_day(d(2024, 1, 5))); // Friday
        assert!(!cal.is_working_day(d(2024, 1, 6))); // Saturday
        assert!(!cal.is_working_day(d(2024, 1, 7))); // Sunday
        assert!(cal.is_working_day(d(2024, 1, 8))); // Monday
    }

    #[test]
    fn test_blocked_overrides() {
        let cal = Calendar::new("std").with_blocked(d(2024, 1, 8), d(2024, 1, 10));
        assert!(!cal.is_working_day(d(2024, 1, 8))); // blocked Monday
        assert!(!cal.is_working_day(d(2024, 1, 9)));
        assert!(cal.is_working_day(d(2024, 1, 10))); // window end is exclusive
    }

    #[test]
    fn test_next_working_day() {
        let cal = Calendar::new("std");
        assert_eq!(cal.next_working_day(d(2024, 1, 5)), Some(d(2024, 1, 5)));
        assert_eq!(cal.next_working_day(d(2024, 1, 6)), Some(d(2024, 1, 8)));

        let blocked = Calendar::new("b").with_blocked(d(2024, 1, 8), d(2024, 1, 12));
        assert_eq!(blocked.next_working_day(d(2024, 1, 8)), Some(d(2024, 1, 12)));
    }

    #[test]
    fn test_next_working_day_none_when_no_weekdays() {
        let cal = Calendar::new("empty").with_working_days(vec![]);
        assert_eq!(cal.next_working_day(d(2024, 1, 1)), None);
    }

    #[test]
    fn test_working_days_in_range() {
        let cal = Calendar::new("std");
        // Mon 2024-01-08 .. Mon 2024-01-15 → Mon-Fri = 5 days
        assert_eq!(cal.working_days_in_range(d(2024, 1, 8), d(2024, 1, 15)), 5);
        assert_eq!(cal.working_days_in_range(d(2024, 1, 8), d(2024, 1, 8)), 0);

        let blocked = Calendar::new("b").with_blocked(d(2024, 1, 9), d(2024, 1, 11));
        assert_eq!(
            blocked.working_days_in_range(d(2024, 1, 8), d(2024, 1, 15)),
            3
        );
    }
}
