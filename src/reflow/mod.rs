//! The reflow engine (spec.md §4.10): given a batch of instances with
//! wiggle-derived candidate domains, a link graph, and a constraint set,
//! find a complete start-time assignment satisfying every constraint, or
//! report a structured failure. No direct teacher analog — the hardest
//! module in this crate — grounded purely in spec.md's 7-step algorithm.
//!
//! Pure and synchronous once its inputs are materialized (spec.md §5): the
//! engine never touches storage, so callers materialize instances/links/
//! constraints first (typically via `series`/`exceptions`/`links`/
//! `constraints`), then call `solve`.

pub mod conflict;
pub mod domain;
pub mod propagate;
pub mod search;

use tracing::instrument;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::Link;
use crate::time::{CalendarDate, TimeOfDay};

use conflict::{check_chains, check_overlaps, extract_conflicts, Conflict};
use domain::Instance;
use propagate::{propagate, Edge};
use search::{search, workload_score, SearchResult};

/// Default search-node budget (spec.md §5: "large enough for ≈1000
/// instances").
pub const DEFAULT_NODE_BUDGET: usize = 50_000;

#[derive(Debug, Clone)]
pub struct Placement {
    pub instance_id: Uuid,
    pub date: CalendarDate,
    pub start: Option<TimeOfDay>,
}

pub enum ReflowOutcome {
    Solved {
        placements: Vec<Placement>,
        workload_score: f64,
    },
    Failed {
        conflicts: Vec<Conflict>,
        partial: Vec<Placement>,
    },
}

/// Run the full 7-step algorithm. `links` pairs (parent index, child index,
/// link spec) into the `instances` slice; `edges` are the binary relational
/// constraints, already resolved to instance indices by the caller (which
/// has the tag/series resolution context `constraints::resolve_target`
/// needs).
#[instrument(skip(instances, edges, links))]
pub fn solve(
    mut instances: Vec<Instance>,
    edges: Vec<Edge>,
    links: Vec<(usize, usize, Link)>,
    node_budget: usize,
) -> Result<ReflowOutcome, CoreError> {
    // Deterministic ordering: stable lexicographic (seriesId, date,
    // startTime) as spec.md §4.10 requires for tie-breaking. Each
    // instance's domain is already sorted (Candidate derives Ord), and we
    // sort the instance list itself so MRV ties resolve the same way across
    // runs with identical input.
    let mut order: Vec<usize> = (0..instances.len()).collect();
    order.sort_by(|&a, &b| {
        instances[a]
            .series_id
            .cmp(&instances[b].series_id)
            .then(instances[a].base_date.cmp(&instances[b].base_date))
    });
    for instance in instances.iter_mut() {
        instance.domain.sort();
    }

    // Step 2: arc-consistency pre-propagation.
    if !propagate(&mut instances, &edges) {
        let conflicts = extract_conflicts(&instances, &edges);
        return Ok(ReflowOutcome::Failed {
            conflicts,
            partial: Vec::new(),
        });
    }

    // Steps 3-4: MRV/LCV backtracking search with workload tie-break.
    match search(&mut instances, &edges, node_budget) {
        SearchResult::Solved(assignment) => {
            let score = workload_score(&instances, &assignment);

            // Steps 5-6: overlap and chain verification. A search success
            // that fails either check is a bug in the constraint encoding
            // rather than a legitimate scheduling conflict, but we still
            // surface it as a structured failure rather than claim success
            // (spec.md §4.10: "never return a partial-but-inconsistent
            // success").
            let overlap_conflicts = check_overlaps(&instances, &assignment);
            let chain_conflicts = check_chains(&instances, &assignment, &links);
            if !overlap_conflicts.is_empty() || !chain_conflicts.is_empty() {
                let mut conflicts = overlap_conflicts;
                conflicts.extend(chain_conflicts);
                return Ok(ReflowOutcome::Failed {
                    conflicts,
                    partial: to_placements(&instances, &assignment),
                });
            }

            Ok(ReflowOutcome::Solved {
                placements: to_placements(&instances, &assignment),
                workload_score: score,
            })
        }
        SearchResult::Infeasible { partial } => {
            let conflicts = extract_conflicts(&instances, &edges);
            Ok(ReflowOutcome::Failed {
                conflicts,
                partial: to_placements(&instances, &partial),
            })
        }
        SearchResult::BudgetExhausted { partial: _ } => Err(CoreError::BudgetExhausted),
    }
}

fn to_placements(instances: &[Instance], assignment: &search::Assignment) -> Vec<Placement> {
    let mut out = Vec::with_capacity(assignment.len());
    for (idx, candidate) in assignment {
        let instance = &instances[*idx];
        let date = candidate.resolve_date(instance.base_date);
        let start = if instance.all_day {
            None
        } else {
            Some(
                TimeOfDay::from_hms(
                    (candidate.start_minutes / 60) as u32,
                    (candidate.start_minutes % 60) as u32,
                    0,
                )
                .expect("candidate minutes are always within a day"),
            )
        };
        out.push(Placement {
            instance_id: instance.id,
            date,
            start,
        });
    }
    out.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TimeSpec, Wiggle};
    use domain::generate_domain;

    fn fixed_instance(date: &str, time: &str) -> Instance {
        Instance {
            id: Uuid::new_v4(),
            series_id: Uuid::new_v4(),
            base_date: CalendarDate::parse(date).unwrap(),
            duration_minutes: Some(30),
            fixed: true,
            all_day: false,
            domain: generate_domain(TimeSpec::At(TimeOfDay::parse(time).unwrap()), Wiggle::none(), true, 15),
        }
    }

    #[test]
    fn two_non_overlapping_fixed_instances_solve_cleanly() {
        let instances = vec![fixed_instance("2024-01-01", "09:00"), fixed_instance("2024-01-01", "10:00")];
        match solve(instances, vec![], vec![], DEFAULT_NODE_BUDGET).unwrap() {
            ReflowOutcome::Solved { placements, .. } => assert_eq!(placements.len(), 2),
            ReflowOutcome::Failed { .. } => panic!("expected a solution"),
        }
    }

    #[test]
    fn two_overlapping_fixed_instances_fail_with_fixed_overlap() {
        let instances = vec![fixed_instance("2024-01-01", "09:00"), fixed_instance("2024-01-01", "09:15")];
        match solve(instances, vec![], vec![], DEFAULT_NODE_BUDGET).unwrap() {
            ReflowOutcome::Solved { .. } => panic!("expected a conflict"),
            ReflowOutcome::Failed { conflicts, .. } => {
                assert!(conflicts.iter().any(|c| c.constraint_type == conflict::ConflictKind::FixedOverlap));
            }
        }
    }
}
