//! Relational constraints (spec.md §3/§4.9): global ordering/proximity rules
//! between two resolved target sets (a tag or a single series). Pure
//! functions consumed by the reflow search's constraint-satisfaction checks.
//!
//! Two levels of check exist, per spec.md §4.9:
//! - [`pair_satisfies`] is the cheap *pairwise* approximation the arc-
//!   consistency propagator prunes domains with (no visibility into the rest
//!   of the placement set).
//! - [`is_satisfied`] is the authoritative check run once a full candidate
//!   assignment exists, with the complete placement set in view — this is
//!   the one that actually implements `mustBeNextTo`'s "no third instance in
//!   the gap" rule, which a binary pairwise check cannot express.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{ConstraintTarget, ConstraintType, RelationalConstraint, Tag};
use crate::time::CalendarDate;

/// Resolve a `ConstraintTarget` to the concrete set of series ids it covers.
pub fn resolve_target(target: ConstraintTarget, tags: &[Tag], series_by_tag: &HashMap<Uuid, Vec<Uuid>>) -> Vec<Uuid> {
    match target {
        ConstraintTarget::Series(id) => vec![id],
        ConstraintTarget::Tag(tag_id) => {
            let _ = tags;
            series_by_tag.get(&tag_id).cloned().unwrap_or_default()
        }
    }
}

/// One scheduled instance, as the constraint checker needs to see it: which
/// series it belongs to, when it falls, and (unless all-day) its scheduled
/// `[start, end)` range in minutes-of-day.
#[derive(Debug, Clone, Copy)]
pub struct PlacedInstance {
    pub series_id: Uuid,
    pub date: CalendarDate,
    pub start_minutes: Option<i64>,
    pub end_minutes: Option<i64>,
}

/// Whether `constraint` holds across every pair of instances drawn from its
/// source/dest target sets within `placements`, with full visibility into
/// every other placed instance (needed for `mustBeNextTo`/`cantBeNextTo`). A
/// constraint with an empty source or dest set is vacuously satisfied
/// (spec.md §4.9: no matching instances means nothing to violate).
pub fn is_satisfied(
    constraint: &RelationalConstraint,
    source_ids: &[Uuid],
    dest_ids: &[Uuid],
    placements: &[PlacedInstance],
) -> bool {
    let sources: Vec<&PlacedInstance> = placements.iter().filter(|p| source_ids.contains(&p.series_id)).collect();
    let dests: Vec<&PlacedInstance> = placements.iter().filter(|p| dest_ids.contains(&p.series_id)).collect();
    if sources.is_empty() || dests.is_empty() {
        return true;
    }
    for s in &sources {
        for d in &dests {
            if s.series_id == d.series_id && s.date == d.date && s.start_minutes == d.start_minutes {
                continue;
            }
            if !pair_satisfies_full(constraint.kind, s, d, placements) {
                return false;
            }
        }
    }
    true
}

/// Full-context pair check: identical to [`pair_satisfies`] for every kind
/// except `mustBeNextTo`/`cantBeNextTo`, which need to see every other
/// instance on the shared day to decide whether a third instance sits in the
/// gap between `source` and `dest`.
fn pair_satisfies_full(
    kind: ConstraintType,
    source: &PlacedInstance,
    dest: &PlacedInstance,
    placements: &[PlacedInstance],
) -> bool {
    match kind {
        ConstraintType::MustBeNextTo => adjacent_with_no_gap_occupant(source, dest, placements),
        ConstraintType::CantBeNextTo => !adjacent_with_no_gap_occupant(source, dest, placements),
        _ => pair_satisfies(kind, source, dest),
    }
}

/// The cheap pairwise check used by arc-consistency propagation (spec.md
/// §4.10 step 2), where only the two domains under consideration are in
/// scope. `mustBeNextTo`/`cantBeNextTo` are approximated here as "directly
/// back to back" (zero gap) since the third-instance rule needs the full
/// placement set — [`is_satisfied`] is the authoritative check that actually
/// enforces it once a full assignment is produced.
pub(crate) fn pair_satisfies(kind: ConstraintType, source: &PlacedInstance, dest: &PlacedInstance) -> bool {
    match kind {
        ConstraintType::MustBeOnSameDay => source.date == dest.date,
        ConstraintType::CantBeOnSameDay => source.date != dest.date,
        ConstraintType::MustBeNextTo => same_day_allday_excluded(source, dest) && gap_minutes(source, dest) == Some(0),
        ConstraintType::CantBeNextTo => !(same_day_allday_excluded(source, dest) && gap_minutes(source, dest) == Some(0)),
        ConstraintType::MustBeBefore => {
            source.date < dest.date
                || (source.date == dest.date && source_end_before_dest_start(source, dest))
        }
        ConstraintType::MustBeAfter => {
            source.date > dest.date
                || (source.date == dest.date && source_end_before_dest_start(dest, source))
        }
        ConstraintType::MustBeWithin(minutes) => within_minutes(source, dest, minutes),
    }
}

/// Whether `earlier.end <= later.start` (excludes all-day instances per
/// spec.md §4.9: intra-day comparisons never apply to all-day entries).
fn source_end_before_dest_start(earlier: &PlacedInstance, later: &PlacedInstance) -> bool {
    match (earlier.end_minutes, later.start_minutes) {
        (Some(end), Some(start)) => end <= start,
        _ => false,
    }
}

/// `dest.start - source.end`, across days if needed, in minutes. `None` when
/// either side is all-day.
fn gap_minutes(source: &PlacedInstance, dest: &PlacedInstance) -> Option<i64> {
    let source_end = source.end_minutes?;
    let dest_start = dest.start_minutes?;
    let day_distance = source.date.days_between(&dest.date) * 24 * 60;
    Some(day_distance + dest_start - source_end)
}

fn same_day_allday_excluded(source: &PlacedInstance, dest: &PlacedInstance) -> bool {
    source.date == dest.date && source.start_minutes.is_some() && dest.start_minutes.is_some()
}

/// `mustBeWithin(k)`: `dest.start - source.end <= k` minutes, boundary
/// inclusive (spec.md §4.9). Directional — if `dest` actually precedes
/// `source` the gap is negative and trivially within any non-negative `k`.
fn within_minutes(source: &PlacedInstance, dest: &PlacedInstance, minutes: u32) -> bool {
    match gap_minutes(source, dest) {
        Some(gap) => gap <= minutes as i64,
        None => false,
    }
}

/// Whether `source` and `dest` are adjacent on the same day (zero-gap back
/// to back, in either order) with no third placed, non-all-day instance's
/// start falling strictly inside the gap between them.
fn adjacent_with_no_gap_occupant(
    source: &PlacedInstance,
    dest: &PlacedInstance,
    placements: &[PlacedInstance],
) -> bool {
    let (earlier, later) = match (source.start_minutes, dest.start_minutes) {
        (Some(a), Some(b)) if a <= b => (source, dest),
        (Some(_), Some(_)) => (dest, source),
        _ => return false,
    };
    if earlier.date != later.date {
        return false;
    }
    let (gap_start, gap_end) = match (earlier.end_minutes, later.start_minutes) {
        (Some(e), Some(s)) if e <= s => (e, s),
        _ => return false,
    };
    !placements.iter().any(|p| {
        p.date == earlier.date
            && p.start_minutes.map(|s| s > gap_start && s < gap_end).unwrap_or(false)
            && !std::ptr::eq(p, earlier)
            && !std::ptr::eq(p, later)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(series_id: Uuid, date: &str, start: Option<i64>, end: Option<i64>) -> PlacedInstance {
        PlacedInstance {
            series_id,
            date: CalendarDate::parse(date).unwrap(),
            start_minutes: start,
            end_minutes: end,
        }
    }

    #[test]
    fn must_be_on_same_day_checks_date_equality() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let constraint = RelationalConstraint {
            id: Uuid::new_v4(),
            source: ConstraintTarget::Series(a),
            dest: ConstraintTarget::Series(b),
            kind: ConstraintType::MustBeOnSameDay,
        };
        let placements = vec![
            instance(a, "2024-01-01", None, None),
            instance(b, "2024-01-01", None, None),
        ];
        assert!(is_satisfied(&constraint, &[a], &[b], &placements));

        let placements_bad = vec![
            instance(a, "2024-01-01", None, None),
            instance(b, "2024-01-02", None, None),
        ];
        assert!(!is_satisfied(&constraint, &[a], &[b], &placements_bad));
    }

    #[test]
    fn empty_target_set_is_vacuously_satisfied() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let constraint = RelationalConstraint {
            id: Uuid::new_v4(),
            source: ConstraintTarget::Series(a),
            dest: ConstraintTarget::Series(b),
            kind: ConstraintType::CantBeOnSameDay,
        };
        assert!(is_satisfied(&constraint, &[a], &[b], &[]));
    }

    #[test]
    fn must_be_before_compares_source_end_to_dest_start() {
        // spec.md §8 scenario 4: A 09:00-10:00, B 10:00-11:00 satisfies
        // mustBeBefore(A,B); swapping A to 11:00-12:00 violates it.
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let constraint = RelationalConstraint {
            id: Uuid::new_v4(),
            source: ConstraintTarget::Series(a),
            dest: ConstraintTarget::Series(b),
            kind: ConstraintType::MustBeBefore,
        };
        let ok = vec![
            instance(a, "2024-01-15", Some(540), Some(600)),
            instance(b, "2024-01-15", Some(600), Some(660)),
        ];
        assert!(is_satisfied(&constraint, &[a], &[b], &ok));

        let bad = vec![
            instance(a, "2024-01-15", Some(660), Some(720)),
            instance(b, "2024-01-15", Some(600), Some(660)),
        ];
        assert!(!is_satisfied(&constraint, &[a], &[b], &bad));
    }

    #[test]
    fn must_be_within_is_directional_and_uses_source_end() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let constraint = RelationalConstraint {
            id: Uuid::new_v4(),
            source: ConstraintTarget::Series(a),
            dest: ConstraintTarget::Series(b),
            kind: ConstraintType::MustBeWithin(30),
        };
        let placements = vec![
            instance(a, "2024-01-01", Some(540), Some(560)),
            instance(b, "2024-01-01", Some(580), Some(600)),
        ];
        assert!(is_satisfied(&constraint, &[a], &[b], &placements));

        let placements_bad = vec![
            instance(a, "2024-01-01", Some(540), Some(560)),
            instance(b, "2024-01-01", Some(700), Some(720)),
        ];
        assert!(!is_satisfied(&constraint, &[a], &[b], &placements_bad));
    }

    #[test]
    fn must_be_next_to_rejects_a_third_instance_in_the_gap() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let constraint = RelationalConstraint {
            id: Uuid::new_v4(),
            source: ConstraintTarget::Series(a),
            dest: ConstraintTarget::Series(b),
            kind: ConstraintType::MustBeNextTo,
        };
        let back_to_back = vec![
            instance(a, "2024-01-01", Some(540), Some(570)),
            instance(b, "2024-01-01", Some(570), Some(600)),
        ];
        assert!(is_satisfied(&constraint, &[a], &[b], &back_to_back));

        let with_intruder = vec![
            instance(a, "2024-01-01", Some(540), Some(570)),
            instance(b, "2024-01-01", Some(600), Some(630)),
            instance(c, "2024-01-01", Some(580), Some(590)),
        ];
        assert!(!is_satisfied(&constraint, &[a], &[b], &with_intruder));
    }
}
