//! Calendar date, local time-of-day, and local date-time primitives.
//!
//! These three types are deliberately distinct so that a date can never be
//! used where a time or a datetime is expected without an explicit
//! conversion. Everything here is naive/local: there is no time-zone
//! conversion anywhere in this crate (spec Non-goal).

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Monday=1 ... Sunday=7, fixed per the crate-wide numbering convention.
/// `chrono::Weekday` numbers Monday=0, so every boundary crossing goes
/// through `from_chrono`/`to_chrono` rather than raw casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
    Sunday = 7,
}

impl Weekday {
    pub fn from_chrono(w: chrono::Weekday) -> Self {
        match w {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Weekday::Saturday | Weekday::Sunday)
    }

    pub fn number(self) -> u8 {
        self as u8
    }
}

/// A calendar date (YYYY-MM-DD), naive and zone-less.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, CoreError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(CalendarDate)
            .ok_or_else(|| CoreError::ParseError(format!("invalid date {year}-{month:02}-{day:02}")))
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(CalendarDate)
            .map_err(|e| CoreError::ParseError(format!("invalid date '{s}': {e}")))
    }

    pub fn format(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn inner(&self) -> NaiveDate {
        self.0
    }

    pub fn from_naive(d: NaiveDate) -> Self {
        CalendarDate(d)
    }

    pub fn add_days(&self, days: i64) -> Self {
        CalendarDate(self.0 + Duration::days(days))
    }

    pub fn sub_days(&self, days: i64) -> Self {
        CalendarDate(self.0 - Duration::days(days))
    }

    /// Signed number of days from `self` to `other`.
    pub fn days_between(&self, other: &Self) -> i64 {
        (other.0 - self.0).num_days()
    }

    pub fn weekday(&self) -> Weekday {
        Weekday::from_chrono(self.0.weekday())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Number of days in this date's month, accounting for leap years.
    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.0.year(), self.0.month())
    }

    pub fn with_day(&self, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(self.0.year(), self.0.month(), day).map(CalendarDate)
    }

    pub fn make_datetime(&self, time: TimeOfDay) -> LocalDateTime {
        LocalDateTime(NaiveDateTime::new(self.0, time.inner()))
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid next-month boundary");
    let this_month_first =
        NaiveDate::from_ymd_opt(year, month, 1).expect("valid first-of-month");
    (next_month_first - this_month_first).num_days() as u32
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// A local time-of-day (HH:MM or HH:MM:SS), naive and zone-less.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn from_hms(h: u32, m: u32, s: u32) -> Result<Self, CoreError> {
        NaiveTime::from_hms_opt(h, m, s)
            .map(TimeOfDay)
            .ok_or_else(|| CoreError::ParseError(format!("invalid time {h:02}:{m:02}:{s:02}")))
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .map(TimeOfDay)
            .map_err(|e| CoreError::ParseError(format!("invalid time '{s}': {e}")))
    }

    pub fn format(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }

    pub fn inner(&self) -> NaiveTime {
        self.0
    }

    pub fn from_naive(t: NaiveTime) -> Self {
        TimeOfDay(t)
    }

    pub fn minutes_since_midnight(&self) -> i64 {
        (self.0.num_seconds_from_midnight() / 60) as i64
    }

    pub fn add_minutes(&self, minutes: i64) -> Self {
        TimeOfDay(self.0 + Duration::minutes(minutes))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// A local date-time (YYYY-MM-DDTHH:MM:SS[.sss]), naive and zone-less.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalDateTime(NaiveDateTime);

impl LocalDateTime {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
            .map(LocalDateTime)
            .map_err(|e| CoreError::ParseError(format!("invalid datetime '{s}': {e}")))
    }

    pub fn format(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    pub fn inner(&self) -> NaiveDateTime {
        self.0
    }

    pub fn from_naive(dt: NaiveDateTime) -> Self {
        LocalDateTime(dt)
    }

    pub fn date(&self) -> CalendarDate {
        CalendarDate(self.0.date())
    }

    pub fn time(&self) -> TimeOfDay {
        TimeOfDay(self.0.time())
    }

    pub fn add_minutes(&self, minutes: i64) -> Self {
        LocalDateTime(self.0 + Duration::minutes(minutes))
    }

    pub fn minutes_between(&self, other: &Self) -> i64 {
        (other.0 - self.0).num_minutes()
    }
}

impl fmt::Display for LocalDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// A half-open date window `[from, to)` used to bound pattern expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: CalendarDate,
    pub to: CalendarDate,
}

impl DateWindow {
    pub fn new(from: CalendarDate, to: CalendarDate) -> Result<Self, CoreError> {
        if from > to {
            return Err(CoreError::InvalidRange(format!(
                "window from {from} is after to {to}"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: &CalendarDate) -> bool {
        *date >= self.from && *date < self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_between_is_additive() {
        let a = CalendarDate::from_ymd(2024, 1, 1).unwrap();
        let b = CalendarDate::from_ymd(2024, 3, 15).unwrap();
        let c = CalendarDate::from_ymd(2024, 6, 1).unwrap();
        assert_eq!(
            a.days_between(&b) + b.days_between(&c),
            a.days_between(&c)
        );
    }

    #[test]
    fn weekday_numbering_is_monday_one() {
        // 2024-01-01 is a Monday.
        let d = CalendarDate::from_ymd(2024, 1, 1).unwrap();
        assert_eq!(d.weekday().number(), 1);
        let d2 = CalendarDate::from_ymd(2024, 1, 7).unwrap();
        assert_eq!(d2.weekday().number(), 7);
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 4), 30);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(CalendarDate::parse("not-a-date").is_err());
        assert!(TimeOfDay::parse("25:99").is_err());
    }

    #[test]
    fn date_window_rejects_inverted_range() {
        let from = CalendarDate::from_ymd(2024, 5, 1).unwrap();
        let to = CalendarDate::from_ymd(2024, 1, 1).unwrap();
        assert!(matches!(
            DateWindow::new(from, to),
            Err(CoreError::InvalidRange(_))
        ));
    }
}
