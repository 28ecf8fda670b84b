//! Instance exceptions (spec.md §4.11): per-occurrence cancel/reschedule
//! overrides, applied after pattern expansion and before CSP domain
//! assembly. Grounded on the teacher's `repository/exceptions.rs`
//! upsert-by-unique-key style.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{ExceptionType, InstanceException};
use crate::time::{CalendarDate, TimeOfDay};

/// Build a cancel exception for `(series_id, original_date)`.
pub fn cancel(series_id: Uuid, original_date: CalendarDate) -> InstanceException {
    InstanceException {
        series_id,
        original_date,
        kind: ExceptionType::Cancelled,
        new_date: None,
        new_time: None,
    }
}

/// Build a reschedule exception for `(series_id, original_date)`, moving the
/// instance to `new_date`/`new_time` (either may be left unset to keep the
/// original value on that axis).
pub fn reschedule(
    series_id: Uuid,
    original_date: CalendarDate,
    new_date: Option<CalendarDate>,
    new_time: Option<TimeOfDay>,
) -> InstanceException {
    InstanceException {
        series_id,
        original_date,
        kind: ExceptionType::Rescheduled,
        new_date,
        new_time,
    }
}

/// One pattern-expanded occurrence, prior to exception application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedOccurrence {
    pub date: CalendarDate,
    pub time: Option<TimeOfDay>,
}

/// Apply a series' exceptions to its pattern-expanded occurrence list:
/// `cancelled` removes the occurrence; `rescheduled` changes its date and/or
/// time. Exceptions are keyed by the occurrence's *original* date, so this
/// must run before any other date-shifting step.
pub fn apply(
    occurrences: Vec<ExpandedOccurrence>,
    exceptions: &[InstanceException],
) -> Vec<ExpandedOccurrence> {
    let by_date: HashMap<CalendarDate, &InstanceException> =
        exceptions.iter().map(|e| (e.original_date, e)).collect();

    let mut out = Vec::with_capacity(occurrences.len());
    for occurrence in occurrences {
        match by_date.get(&occurrence.date) {
            None => out.push(occurrence),
            Some(exception) => match exception.kind {
                ExceptionType::Cancelled => {}
                ExceptionType::Rescheduled => {
                    out.push(ExpandedOccurrence {
                        date: exception.new_date.unwrap_or(occurrence.date),
                        time: exception.new_time.or(occurrence.time),
                    });
                }
            },
        }
    }
    out.sort_by_key(|o| o.date);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_occurrence_is_removed() {
        let series_id = Uuid::new_v4();
        let d = CalendarDate::parse("2024-01-05").unwrap();
        let occurrences = vec![ExpandedOccurrence { date: d, time: None }];
        let exceptions = vec![cancel(series_id, d)];
        assert!(apply(occurrences, &exceptions).is_empty());
    }

    #[test]
    fn rescheduled_occurrence_moves_date_and_time() {
        let series_id = Uuid::new_v4();
        let original = CalendarDate::parse("2024-01-05").unwrap();
        let new_date = CalendarDate::parse("2024-01-07").unwrap();
        let occurrences = vec![ExpandedOccurrence { date: original, time: None }];
        let exceptions = vec![reschedule(series_id, original, Some(new_date), Some(TimeOfDay::from_hms(9, 0, 0).unwrap()))];
        let result = apply(occurrences, &exceptions);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].date, new_date);
        assert!(result[0].time.is_some());
    }

    #[test]
    fn upsert_replaces_prior_exception_for_same_key() {
        let series_id = Uuid::new_v4();
        let d = CalendarDate::parse("2024-01-05").unwrap();
        let mut exceptions = vec![cancel(series_id, d)];
        exceptions[0] = reschedule(series_id, d, Some(d.add_days(1)), None);
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].kind, ExceptionType::Rescheduled);
    }
}
