//! Step 2 of the reflow algorithm: arc-consistency pre-propagation and
//! re-propagation after each search assignment. Iteratively removes domain
//! values inconsistent with any binary constraint (a relational constraint
//! or a link) given all other domains, to a fixed point.

use crate::constraints::{pair_satisfies, PlacedInstance};
use crate::models::ConstraintType;

use super::domain::{Candidate, Instance};

/// A binary relation between two instances (by index into the instance
/// slice) that every chosen pair of candidates must satisfy.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    pub kind: ConstraintType,
}

fn as_placed(instance: &Instance, candidate: &Candidate) -> PlacedInstance {
    let start_minutes = if instance.all_day {
        None
    } else {
        Some(candidate.start_minutes)
    };
    let end_minutes = match (start_minutes, instance.duration_minutes) {
        (Some(start), Some(duration)) => Some(start + duration as i64),
        _ => None,
    };
    PlacedInstance {
        series_id: instance.series_id,
        date: candidate.resolve_date(instance.base_date),
        start_minutes,
        end_minutes,
    }
}

fn consistent(a: &Instance, ca: &Candidate, b: &Instance, cb: &Candidate, kind: ConstraintType) -> bool {
    pair_satisfies(kind, &as_placed(a, ca), &as_placed(b, cb))
}

/// Run arc-consistency to a fixed point. Returns `false` if any instance's
/// domain becomes empty (infeasibility detected without search).
pub fn propagate(instances: &mut [Instance], edges: &[Edge]) -> bool {
    let mut changed = true;
    while changed {
        changed = false;
        for edge in edges {
            if edge.a == edge.b {
                continue;
            }
            let (before_a, before_b) = (instances[edge.a].domain.len(), instances[edge.b].domain.len());

            let b_domain = instances[edge.b].domain.clone();
            let b_instance_snapshot = instances[edge.b].clone_light();
            let a_instance = &mut instances[edge.a];
            a_instance.domain.retain(|ca| {
                b_domain
                    .iter()
                    .any(|cb| consistent(a_instance, ca, &b_instance_snapshot, cb, edge.kind))
            });

            let a_domain = instances[edge.a].domain.clone();
            let a_instance_snapshot = instances[edge.a].clone_light();
            let b_instance = &mut instances[edge.b];
            b_instance.domain.retain(|cb| {
                a_domain
                    .iter()
                    .any(|ca| consistent(&a_instance_snapshot, ca, b_instance, cb, edge.kind))
            });

            if instances[edge.a].domain.len() != before_a || instances[edge.b].domain.len() != before_b {
                changed = true;
            }
            if instances[edge.a].is_empty_domain() || instances[edge.b].is_empty_domain() {
                return false;
            }
        }
    }
    instances.iter().all(|i| !i.is_empty_domain())
}

impl Instance {
    /// A cheap clone used only to satisfy the borrow checker while one
    /// instance's domain is retained against a snapshot of another's.
    fn clone_light(&self) -> Instance {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflow::domain::Candidate;
    use crate::time::CalendarDate;
    use uuid::Uuid;

    fn instance(minutes: Vec<i64>) -> Instance {
        Instance {
            id: Uuid::new_v4(),
            series_id: Uuid::new_v4(),
            base_date: CalendarDate::parse("2024-01-01").unwrap(),
            duration_minutes: Some(30),
            fixed: false,
            all_day: false,
            domain: minutes
                .into_iter()
                .map(|m| Candidate { day_offset: 0, start_minutes: m })
                .collect(),
        }
    }

    #[test]
    fn cant_be_on_same_day_prunes_nothing_when_dates_differ() {
        let mut a = instance(vec![540]);
        a.base_date = CalendarDate::parse("2024-01-01").unwrap();
        let mut b = instance(vec![600]);
        b.base_date = CalendarDate::parse("2024-01-02").unwrap();
        let mut instances = vec![a, b];
        let edges = vec![Edge { a: 0, b: 1, kind: ConstraintType::CantBeOnSameDay }];
        assert!(propagate(&mut instances, &edges));
        assert_eq!(instances[0].domain.len(), 1);
        assert_eq!(instances[1].domain.len(), 1);
    }

    #[test]
    fn must_be_within_prunes_incompatible_candidates() {
        let a = instance(vec![540]);
        let b = instance(vec![560, 800]);
        let mut instances = vec![a, b];
        let edges = vec![Edge { a: 0, b: 1, kind: ConstraintType::MustBeWithin(30) }];
        assert!(propagate(&mut instances, &edges));
        assert_eq!(instances[1].domain, vec![Candidate { day_offset: 0, start_minutes: 560 }]);
    }

    #[test]
    fn unsatisfiable_edge_empties_domain() {
        let a = instance(vec![540]);
        let b = instance(vec![540]);
        let mut instances = vec![a, b];
        let edges = vec![Edge { a: 0, b: 1, kind: ConstraintType::MustBeNextTo }];
        assert!(!propagate(&mut instances, &edges));
    }
}
