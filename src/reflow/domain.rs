//! Step 1 of the reflow algorithm (spec.md §4.10): candidate-domain
//! generation. One `Instance` per scheduled occurrence, carrying the
//! discrete set of `(dayOffset, startMinutes)` candidates its wiggle
//! allows — a singleton for fixed instances.

use uuid::Uuid;

use crate::links::child_valid_window;
use crate::models::{Link, TimeSpec, Wiggle};
use crate::time::{CalendarDate, TimeOfDay};

/// One candidate placement: `day_offset` days from the instance's nominal
/// date, at `start_minutes` past midnight on that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    pub day_offset: i64,
    pub start_minutes: i64,
}

impl Candidate {
    pub fn resolve_date(&self, base: CalendarDate) -> CalendarDate {
        base.add_days(self.day_offset)
    }
}

/// One instance awaiting placement.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: Uuid,
    pub series_id: Uuid,
    pub base_date: CalendarDate,
    pub duration_minutes: Option<u32>,
    pub fixed: bool,
    pub all_day: bool,
    pub domain: Vec<Candidate>,
}

impl Instance {
    pub fn is_empty_domain(&self) -> bool {
        self.domain.is_empty()
    }
}

/// Minute-resolution step used when enumerating wiggle-derived start times.
/// Spec.md §4.10 step 1 calls for "discrete minute resolution, document the
/// step" — 15 minutes keeps search tractable while still resolving to
/// quarter-hour granularity, which is finer than any scenario in spec.md §8.
pub const DEFAULT_RESOLUTION_MINUTES: i64 = 15;

/// Build the initial domain for one instance from its series' time-of-day,
/// wiggle spec, and fixed flag.
pub fn generate_domain(
    time_of_day: TimeSpec,
    wiggle: Wiggle,
    fixed: bool,
    resolution_minutes: i64,
) -> Vec<Candidate> {
    let nominal_minutes = match time_of_day {
        TimeSpec::AllDay => 0,
        TimeSpec::At(t) => t.minutes_since_midnight(),
    };

    if fixed || (wiggle.days_before == 0 && wiggle.days_after == 0 && wiggle.earliest.is_none() && wiggle.latest.is_none()) {
        return vec![Candidate {
            day_offset: 0,
            start_minutes: nominal_minutes,
        }];
    }

    let earliest = wiggle
        .earliest
        .map(|t| t.minutes_since_midnight())
        .unwrap_or(0);
    let latest = wiggle
        .latest
        .map(|t| t.minutes_since_midnight())
        .unwrap_or(24 * 60 - 1);

    let mut out = Vec::new();
    let mut day_offset = -(wiggle.days_before as i64);
    while day_offset <= wiggle.days_after as i64 {
        let mut minutes = earliest;
        while minutes <= latest {
            out.push(Candidate {
                day_offset,
                start_minutes: minutes,
            });
            minutes += resolution_minutes;
        }
        day_offset += 1;
    }
    out
}

/// Intersect a linked child instance's domain with its parent's current
/// valid window (spec.md §4.10 step 1: "link-constrained children intersect
/// their domain with the parent's current valid window").
pub fn intersect_with_parent_window(
    child: &mut Instance,
    link: &Link,
    parent_effective_end: crate::time::LocalDateTime,
) {
    let (earliest, latest) = child_valid_window(parent_effective_end, link);
    child.domain.retain(|c| {
        let date = c.resolve_date(child.base_date);
        let dt = date.make_datetime(TimeOfDay::from_hms((c.start_minutes / 60) as u32, (c.start_minutes % 60) as u32, 0).unwrap());
        dt >= earliest && dt <= latest
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_instance_has_singleton_domain() {
        let domain = generate_domain(TimeSpec::At(TimeOfDay::from_hms(9, 0, 0).unwrap()), Wiggle::none(), true, 15);
        assert_eq!(domain.len(), 1);
        assert_eq!(domain[0], Candidate { day_offset: 0, start_minutes: 540 });
    }

    #[test]
    fn wiggle_expands_domain_across_days_and_minutes() {
        let wiggle = Wiggle {
            days_before: 1,
            days_after: 0,
            earliest: Some(TimeOfDay::from_hms(8, 0, 0).unwrap()),
            latest: Some(TimeOfDay::from_hms(8, 30, 0).unwrap()),
        };
        let domain = generate_domain(TimeSpec::At(TimeOfDay::from_hms(8, 15, 0).unwrap()), wiggle, false, 15);
        // 2 days x 3 time slots (8:00, 8:15, 8:30)
        assert_eq!(domain.len(), 6);
    }
}
