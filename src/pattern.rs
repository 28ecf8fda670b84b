//! Recurrence pattern expansion: tagged patterns to sorted, deduplicated
//! date sequences, bounded by a window. Expansion is pure, total, and
//! deterministic — it never touches storage or the clock.

use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::time::{days_in_month, is_leap_year, CalendarDate, DateWindow, Weekday};

/// A mask of weekdays, one bit per `Weekday` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeekdayMask(pub u8);

impl WeekdayMask {
    pub fn empty() -> Self {
        WeekdayMask(0)
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        let mut mask = 0u8;
        for d in days {
            mask |= 1 << (d.number() - 1);
        }
        WeekdayMask(mask)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << (day.number() - 1)) != 0
    }

    pub fn weekdays_mon_fri() -> Self {
        WeekdayMask::from_days(&[
            Weekday::Monday,
            Weekday::Tuesday,
            Weekday::Wednesday,
            Weekday::Thursday,
            Weekday::Friday,
        ])
    }

    pub fn weekends_sat_sun() -> Self {
        WeekdayMask::from_days(&[Weekday::Saturday, Weekday::Sunday])
    }
}

/// A recurrence pattern, a tagged sum type over every variant spec.md §4.2
/// names. Each carries an optional `condition_id` pointing at a `Condition`
/// tree that gates whether an expanded date becomes an instance (evaluated
/// later, by the instance-generation stage — expansion itself never
/// consults history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Daily,
    EveryNDays(u32),
    Weekly(WeekdayMask),
    EveryNWeeks { n: u32, mask: WeekdayMask },
    Monthly(u32),
    LastDayOfMonth,
    Yearly { month: u32, day: u32 },
    Weekdays(WeekdayMask),
    WeekdaysOnly,
    WeekendsOnly,
    NthWeekdayOfMonth { n: u32, weekday: Weekday },
    LastWeekdayOfMonth(Weekday),
    NthToLastWeekdayOfMonth { n: u32, weekday: Weekday },
    Union(Vec<Pattern>),
    Except { base: Box<Pattern>, exclusion: Box<Pattern> },
}

/// A stored pattern row: id + series owner + the pattern tree + optional
/// guarding condition. The tree itself is what gets expanded; `id`/`series_id`
/// only matter at the persistence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: Uuid,
    pub series_id: Uuid,
    pub pattern: Pattern,
    pub condition_id: Option<Uuid>,
}

fn validate(pattern: &Pattern) -> Result<(), CoreError> {
    match pattern {
        Pattern::EveryNDays(n) | Pattern::EveryNWeeks { n, .. } if *n < 1 => Err(
            CoreError::InvalidPattern(format!("n must be >= 1, got {n}")),
        ),
        Pattern::Monthly(d) if *d < 1 || *d > 31 => Err(CoreError::InvalidPattern(format!(
            "day-of-month must be 1..=31, got {d}"
        ))),
        Pattern::Yearly { month, day } => {
            if *month < 1 || *month > 12 {
                Err(CoreError::InvalidPattern(format!(
                    "month must be 1..=12, got {month}"
                )))
            } else if *day < 1 || *day > 31 {
                Err(CoreError::InvalidPattern(format!(
                    "day must be 1..=31, got {day}"
                )))
            } else {
                Ok(())
            }
        }
        Pattern::NthWeekdayOfMonth { n, .. } | Pattern::NthToLastWeekdayOfMonth { n, .. }
            if *n < 1 || *n > 5 =>
        {
            Err(CoreError::InvalidPattern(format!(
                "nth must be 1..=5, got {n}"
            )))
        }
        Pattern::Union(children) => {
            for c in children {
                validate(c)?;
            }
            Ok(())
        }
        Pattern::Except { base, exclusion } => {
            validate(base)?;
            validate(exclusion)
        }
        _ => Ok(()),
    }
}

/// Expand `pattern` over `window` (half-open `[from, to)`), anchored at
/// `seed` where the pattern needs one (every-N-days/weeks strides). Returns a
/// strictly increasing, deduplicated date sequence, all within the window.
pub fn expand(
    pattern: &Pattern,
    window: DateWindow,
    seed: Option<CalendarDate>,
) -> Result<Vec<CalendarDate>, CoreError> {
    validate(pattern)?;
    let mut set = BTreeSet::new();
    expand_into(pattern, window, seed, &mut set)?;
    Ok(set.into_iter().collect())
}

fn expand_into(
    pattern: &Pattern,
    window: DateWindow,
    seed: Option<CalendarDate>,
    out: &mut BTreeSet<CalendarDate>,
) -> Result<(), CoreError> {
    match pattern {
        Pattern::Daily => {
            let floor = seed.map(|s| s.max(window.from)).unwrap_or(window.from);
            let mut d = floor;
            while window.contains(&d) {
                out.insert(d);
                d = d.add_days(1);
            }
        }
        Pattern::EveryNDays(n) => {
            let seed = seed.ok_or_else(|| {
                CoreError::InvalidPattern("everyNDays requires a seed date".into())
            })?;
            let mut d = seed;
            // advance to the first occurrence not before the window start
            if d < window.from {
                let delta = window.from.days_between(&d).abs();
                let steps = (delta as u32).div_ceil(*n);
                d = d.add_days((steps as i64) * (*n as i64));
            }
            while window.contains(&d) {
                out.insert(d);
                d = d.add_days(*n as i64);
            }
        }
        Pattern::Weekly(mask) => {
            expand_weekly_strided(*mask, 1, seed, window, out)?;
        }
        Pattern::EveryNWeeks { n, mask } => {
            expand_weekly_strided(*mask, *n, seed, window, out)?;
        }
        Pattern::Monthly(day) => {
            each_month_in_window(window, |year, month| {
                if *day <= days_in_month(year, month) {
                    if let Ok(d) = CalendarDate::from_ymd(year, month, *day) {
                        if window.contains(&d) {
                            out.insert(d);
                        }
                    }
                }
            });
        }
        Pattern::LastDayOfMonth => {
            each_month_in_window(window, |year, month| {
                let last = days_in_month(year, month);
                if let Ok(d) = CalendarDate::from_ymd(year, month, last) {
                    if window.contains(&d) {
                        out.insert(d);
                    }
                }
            });
        }
        Pattern::Yearly { month, day } => {
            let start_year = window.from.year();
            let end_year = window.to.year();
            for year in start_year..=end_year {
                if *month == 2 && *day == 29 && !is_leap_year(year) {
                    continue;
                }
                if *day > days_in_month(year, *month) {
                    continue;
                }
                if let Ok(d) = CalendarDate::from_ymd(year, *month, *day) {
                    if window.contains(&d) {
                        out.insert(d);
                    }
                }
            }
        }
        Pattern::Weekdays(mask) => {
            each_day_in_window(window, |d| {
                if mask.contains(d.weekday()) {
                    out.insert(d);
                }
            });
        }
        Pattern::WeekdaysOnly => {
            let mask = WeekdayMask::weekdays_mon_fri();
            each_day_in_window(window, |d| {
                if mask.contains(d.weekday()) {
                    out.insert(d);
                }
            });
        }
        Pattern::WeekendsOnly => {
            let mask = WeekdayMask::weekends_sat_sun();
            each_day_in_window(window, |d| {
                if mask.contains(d.weekday()) {
                    out.insert(d);
                }
            });
        }
        Pattern::NthWeekdayOfMonth { n, weekday } => {
            each_month_in_window(window, |year, month| {
                if let Some(d) = nth_weekday_of_month(year, month, *n, *weekday) {
                    if window.contains(&d) {
                        out.insert(d);
                    }
                }
            });
        }
        Pattern::LastWeekdayOfMonth(weekday) => {
            each_month_in_window(window, |year, month| {
                if let Some(d) = last_weekday_of_month(year, month, *weekday) {
                    if window.contains(&d) {
                        out.insert(d);
                    }
                }
            });
        }
        Pattern::NthToLastWeekdayOfMonth { n, weekday } => {
            each_month_in_window(window, |year, month| {
                if let Some(d) = nth_to_last_weekday_of_month(year, month, *n, *weekday) {
                    if window.contains(&d) {
                        out.insert(d);
                    }
                }
            });
        }
        Pattern::Union(children) => {
            for child in children {
                expand_into(child, window, seed, out)?;
            }
        }
        Pattern::Except { base, exclusion } => {
            let mut excl = BTreeSet::new();
            expand_into(exclusion, window, seed, &mut excl)?;
            let mut base_set = BTreeSet::new();
            expand_into(base, window, seed, &mut base_set)?;
            for d in base_set {
                if !excl.contains(&d) {
                    out.insert(d);
                }
            }
        }
    }
    Ok(())
}

fn expand_weekly_strided(
    mask: WeekdayMask,
    n: u32,
    seed: Option<CalendarDate>,
    window: DateWindow,
    out: &mut BTreeSet<CalendarDate>,
) -> Result<(), CoreError> {
    if n < 1 {
        return Err(CoreError::InvalidPattern(
            "week stride must be >= 1".into(),
        ));
    }
    let seed = seed.ok_or_else(|| {
        CoreError::InvalidPattern("weekly patterns require a seed date".into())
    })?;
    // Monday of the week containing seed, per the crate-wide Monday=1 start.
    let seed_week_start = seed.sub_days((seed.weekday().number() - 1) as i64);
    let mut week_start = seed_week_start;
    // rewind/advance week_start to land on or before window.from, in multiples of n weeks
    if week_start < window.from {
        let days_diff = week_start.days_between(&window.from);
        let weeks_diff = days_diff / 7;
        let strides = weeks_diff / (n as i64);
        week_start = week_start.add_days(strides * (n as i64) * 7);
    }
    while week_start < window.to {
        for offset in 0..7 {
            let d = week_start.add_days(offset);
            if d >= seed && window.contains(&d) && mask.contains(d.weekday()) {
                out.insert(d);
            }
        }
        week_start = week_start.add_days((n as i64) * 7);
    }
    Ok(())
}

fn each_day_in_window(window: DateWindow, mut f: impl FnMut(CalendarDate)) {
    let mut d = window.from;
    while window.contains(&d) {
        f(d);
        d = d.add_days(1);
    }
}

fn each_month_in_window(window: DateWindow, mut f: impl FnMut(i32, u32)) {
    let mut year = window.from.year();
    let mut month = window.from.month();
    loop {
        let month_start = CalendarDate::from_ymd(year, month, 1).expect("valid month start");
        if month_start >= window.to {
            break;
        }
        f(year, month);
        if month == 12 {
            month = 1;
            year += 1;
        } else {
            month += 1;
        }
    }
}

fn nth_weekday_of_month(year: i32, month: u32, n: u32, weekday: Weekday) -> Option<CalendarDate> {
    let first = CalendarDate::from_ymd(year, month, 1).ok()?;
    let first_weekday = first.weekday().number();
    let target = weekday.number();
    let offset = (target as i64 - first_weekday as i64).rem_euclid(7);
    let day = 1 + offset + (n as i64 - 1) * 7;
    if day < 1 || day as u32 > days_in_month(year, month) {
        return None;
    }
    CalendarDate::from_ymd(year, month, day as u32).ok()
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<CalendarDate> {
    let last_day = days_in_month(year, month);
    let last = CalendarDate::from_ymd(year, month, last_day).ok()?;
    let last_weekday = last.weekday().number();
    let target = weekday.number();
    let back = (last_weekday as i64 - target as i64).rem_euclid(7);
    Some(last.sub_days(back))
}

fn nth_to_last_weekday_of_month(
    year: i32,
    month: u32,
    n: u32,
    weekday: Weekday,
) -> Option<CalendarDate> {
    let last = last_weekday_of_month(year, month, weekday)?;
    let candidate = last.sub_days((n as i64 - 1) * 7);
    if candidate.year() == year && candidate.month() == month {
        Some(candidate)
    } else {
        None
    }
}

/// Wraps a validated pattern with a cache of prior validation results, the
/// way `RecurrenceManager` caches `is_rrule_valid`/`is_timezone_valid`
/// lookups — repeated validation of the same pattern shape (e.g. re-checking
/// a series' own pattern on every read) is avoided.
pub struct PatternExpander {
    pattern: Pattern,
    seed: Option<CalendarDate>,
}

static VALIDITY_CACHE: OnceLock<Mutex<std::collections::HashMap<String, bool>>> = OnceLock::new();

fn validity_cache() -> &'static Mutex<std::collections::HashMap<String, bool>> {
    VALIDITY_CACHE.get_or_init(|| Mutex::new(std::collections::HashMap::new()))
}

impl PatternExpander {
    pub fn new(pattern: Pattern, seed: Option<CalendarDate>) -> Result<Self, CoreError> {
        let key = format!("{pattern:?}");
        let cached = validity_cache().lock().unwrap().get(&key).copied();
        let valid = match cached {
            Some(v) => v,
            None => {
                let v = validate(&pattern).is_ok();
                validity_cache().lock().unwrap().insert(key, v);
                v
            }
        };
        if !valid {
            validate(&pattern)?;
        }
        Ok(Self { pattern, seed })
    }

    pub fn expand(&self, window: DateWindow) -> Result<Vec<CalendarDate>, CoreError> {
        expand(&self.pattern, window, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn window(from: &str, to: &str) -> DateWindow {
        DateWindow::new(CalendarDate::parse(from).unwrap(), CalendarDate::parse(to).unwrap())
            .unwrap()
    }

    #[test]
    fn every_n_days_scenario_from_spec() {
        let seed = CalendarDate::parse("2024-01-01").unwrap();
        let dates = expand(&Pattern::EveryNDays(3), window("2024-01-01", "2024-01-15"), Some(seed))
            .unwrap();
        let formatted: Vec<String> = dates.iter().map(|d| d.format()).collect();
        assert_eq!(
            formatted,
            vec![
                "2024-01-01", "2024-01-04", "2024-01-07", "2024-01-10", "2024-01-13"
            ]
        );
    }

    #[test]
    fn monthly_skips_overflowing_months() {
        let dates = expand(
            &Pattern::Monthly(30),
            window("2024-01-01", "2024-04-01"),
            None,
        )
        .unwrap();
        // February has no 30th; it must be skipped, not clamped.
        let months: Vec<u32> = dates.iter().map(|d| d.month()).collect();
        assert_eq!(months, vec![1, 3]);
    }

    /// A monthly pattern on day `day` only produces an occurrence in months
    /// that actually have that many days — the overflow month is skipped
    /// entirely (spec.md §9's pinned decision), never clamped to month-end.
    #[rstest]
    #[case::day_29_skips_february_in_a_non_leap_year(29, 2023, vec![1, 3, 4])]
    #[case::day_30_skips_february(30, 2024, vec![1, 3, 4])]
    #[case::day_31_skips_every_30_day_month(31, 2024, vec![1, 3])]
    fn monthly_overflow_skip_cases(#[case] day: u32, #[case] year: i32, #[case] expected_months: Vec<u32>) {
        let dates = expand(
            &Pattern::Monthly(day),
            DateWindow::new(
                CalendarDate::from_ymd(year, 1, 1).unwrap(),
                CalendarDate::from_ymd(year, 5, 1).unwrap(),
            )
            .unwrap(),
            None,
        )
        .unwrap();
        let months: Vec<u32> = dates.iter().map(|d| d.month()).collect();
        assert_eq!(months, expected_months);
    }

    #[test]
    fn yearly_skips_feb29_in_non_leap_years() {
        let dates = expand(
            &Pattern::Yearly { month: 2, day: 29 },
            window("2023-01-01", "2025-12-31"),
            None,
        )
        .unwrap();
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].year(), 2024);
    }

    #[test]
    fn expansion_is_idempotent() {
        let w = window("2024-01-01", "2024-02-01");
        let a = expand(&Pattern::WeekdaysOnly, w, None).unwrap();
        let b = expand(&Pattern::WeekdaysOnly, w, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn union_is_commutative() {
        let w = window("2024-01-01", "2024-01-10");
        let p1 = Pattern::Union(vec![Pattern::Monthly(5), Pattern::Monthly(8)]);
        let p2 = Pattern::Union(vec![Pattern::Monthly(8), Pattern::Monthly(5)]);
        assert_eq!(expand(&p1, w, None).unwrap(), expand(&p2, w, None).unwrap());
    }

    #[test]
    fn except_removes_exclusion_set() {
        let w = window("2024-01-01", "2024-01-10");
        let base = Pattern::Daily;
        let excl = Pattern::Monthly(5);
        let pattern = Pattern::Except {
            base: Box::new(base),
            exclusion: Box::new(excl),
        };
        let seed = CalendarDate::parse("2024-01-01").unwrap();
        let result = expand(&pattern, w, Some(seed)).unwrap();
        assert!(!result.iter().any(|d| d.day() == 5));
    }

    #[test]
    fn invalid_n_is_rejected() {
        assert!(matches!(
            expand(&Pattern::EveryNDays(0), window("2024-01-01", "2024-01-02"), Some(CalendarDate::parse("2024-01-01").unwrap())),
            Err(CoreError::InvalidPattern(_))
        ));
    }

    #[test]
    fn nth_weekday_of_month_matches_manual_count() {
        // 2024-03: first Friday is 2024-03-01, third Friday is 2024-03-15.
        let d = nth_weekday_of_month(2024, 3, 3, Weekday::Friday).unwrap();
        assert_eq!(d.format(), "2024-03-15");
    }

    #[test]
    fn last_weekday_of_month_is_within_last_seven_days() {
        let d = last_weekday_of_month(2024, 2, Weekday::Thursday).unwrap();
        assert_eq!(d.weekday(), Weekday::Thursday);
        assert!(d.day() + 7 > days_in_month(2024, 2));
    }
}
