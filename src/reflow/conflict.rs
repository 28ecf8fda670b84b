//! Steps 5-7 of the reflow algorithm: overlap/chain verification of a
//! candidate solution, and conflict extraction when search fails.

use uuid::Uuid;

use crate::models::{ConstraintType, Link};

use super::domain::Instance;
use super::propagate::Edge;
use super::search::Assignment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    ChainBoundsViolated,
    IntraDayConflict,
    DayConflict,
    FixedOverlap,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub instance_refs: Vec<Uuid>,
    pub constraint_type: ConflictKind,
    pub description: String,
}

/// Step 5: no two non-all-day instances may overlap `[start, end)`.
pub fn check_overlaps(instances: &[Instance], assignment: &Assignment) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    let placed: Vec<(usize, crate::time::CalendarDate, i64, i64)> = assignment
        .iter()
        .filter_map(|(idx, candidate)| {
            let instance = &instances[*idx];
            if instance.all_day {
                return None;
            }
            let start = candidate.start_minutes;
            let end = start + instance.duration_minutes.unwrap_or(0) as i64;
            Some((*idx, candidate.resolve_date(instance.base_date), start, end))
        })
        .collect();

    for i in 0..placed.len() {
        for j in (i + 1)..placed.len() {
            let (idx_a, date_a, start_a, end_a) = placed[i];
            let (idx_b, date_b, start_b, end_b) = placed[j];
            if date_a != date_b {
                continue;
            }
            if start_a < end_b && start_b < end_a {
                let kind = if instances[idx_a].fixed || instances[idx_b].fixed {
                    ConflictKind::FixedOverlap
                } else {
                    ConflictKind::IntraDayConflict
                };
                conflicts.push(Conflict {
                    instance_refs: vec![instances[idx_a].id, instances[idx_b].id],
                    constraint_type: kind,
                    description: format!(
                        "instances overlap on {date_a}: [{start_a},{end_a}) vs [{start_b},{end_b})"
                    ),
                });
            }
        }
    }
    conflicts
}

/// Step 6: each link's child placement must fall within the parent's valid
/// window, recomputed from the parent's *assigned* (not nominal) start.
pub fn check_chains(
    instances: &[Instance],
    assignment: &Assignment,
    links: &[(usize, usize, Link)],
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for (parent_idx, child_idx, link) in links {
        let (Some(parent_candidate), Some(child_candidate)) =
            (assignment.get(parent_idx), assignment.get(child_idx))
        else {
            continue;
        };
        let parent = &instances[*parent_idx];
        let child = &instances[*child_idx];
        let parent_date = parent_candidate.resolve_date(parent.base_date);
        let parent_start = parent_date.make_datetime(
            crate::time::TimeOfDay::from_hms(
                (parent_candidate.start_minutes / 60) as u32,
                (parent_candidate.start_minutes % 60) as u32,
                0,
            )
            .unwrap(),
        );
        // Reflow only ever sees scheduled times, never completion history, so
        // the parent's "effective end" here is always its scheduled end
        // (start + duration); a completion-adjusted target is computed by the
        // caller that builds the link graph, before instances reach reflow.
        let parent_effective_end = crate::links::effective_parent_end(
            parent_start,
            parent.duration_minutes.unwrap_or(0),
            None,
        );
        let child_date = child_candidate.resolve_date(child.base_date);
        let child_start = child_date.make_datetime(
            crate::time::TimeOfDay::from_hms(
                (child_candidate.start_minutes / 60) as u32,
                (child_candidate.start_minutes % 60) as u32,
                0,
            )
            .unwrap(),
        );
        if !crate::links::satisfies_link(parent_effective_end, child_start, link) {
            conflicts.push(Conflict {
                instance_refs: vec![parent.id, child.id],
                constraint_type: ConflictKind::ChainBoundsViolated,
                description: format!(
                    "child instance {} falls outside its link window relative to parent {}",
                    child.id, parent.id
                ),
            });
        }
    }
    conflicts
}

/// Step 7: when search exhausts without a solution, classify the edges that
/// reference an instance whose domain went empty — these are the
/// constraints whose simultaneous violation made the frontier empty.
pub fn extract_conflicts(instances: &[Instance], edges: &[Edge]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for edge in edges {
        let a_empty = instances[edge.a].is_empty_domain();
        let b_empty = instances[edge.b].is_empty_domain();
        if !a_empty && !b_empty {
            continue;
        }
        let kind = match edge.kind {
            ConstraintType::MustBeOnSameDay | ConstraintType::CantBeOnSameDay => ConflictKind::DayConflict,
            ConstraintType::MustBeNextTo
            | ConstraintType::CantBeNextTo
            | ConstraintType::MustBeBefore
            | ConstraintType::MustBeAfter
            | ConstraintType::MustBeWithin(_) => ConflictKind::IntraDayConflict,
        };
        conflicts.push(Conflict {
            instance_refs: vec![instances[edge.a].id, instances[edge.b].id],
            constraint_type: kind,
            description: format!(
                "constraint {:?} between instances {} and {} left an empty domain",
                edge.kind, instances[edge.a].id, instances[edge.b].id
            ),
        });
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflow::domain::Candidate;
    use crate::time::CalendarDate;

    fn instance(fixed: bool) -> Instance {
        Instance {
            id: Uuid::new_v4(),
            series_id: Uuid::new_v4(),
            base_date: CalendarDate::parse("2024-01-01").unwrap(),
            duration_minutes: Some(30),
            fixed,
            all_day: false,
            domain: vec![Candidate { day_offset: 0, start_minutes: 540 }],
        }
    }

    #[test]
    fn detects_overlap_between_two_fixed_instances() {
        let instances = vec![instance(true), instance(true)];
        let mut assignment = Assignment::new();
        assignment.insert(0, Candidate { day_offset: 0, start_minutes: 540 });
        assignment.insert(1, Candidate { day_offset: 0, start_minutes: 550 });
        let conflicts = check_overlaps(&instances, &assignment);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].constraint_type, ConflictKind::FixedOverlap);
    }

    #[test]
    fn no_conflict_when_instances_do_not_overlap() {
        let instances = vec![instance(false), instance(false)];
        let mut assignment = Assignment::new();
        assignment.insert(0, Candidate { day_offset: 0, start_minutes: 540 });
        assignment.insert(1, Candidate { day_offset: 0, start_minutes: 600 });
        assert!(check_overlaps(&instances, &assignment).is_empty());
    }
}
