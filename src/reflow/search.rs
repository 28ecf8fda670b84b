//! Steps 3-4 of the reflow algorithm: MRV/LCV backtracking search with a
//! workload-score tie-break, bounded by a search-node budget (spec.md §5:
//! "configurable search-node budget ... exceeding the budget returns a
//! no-solution result with a budgetExhausted flag").

use std::collections::HashMap;

use crate::time::CalendarDate;

use super::domain::{Candidate, Instance};
use super::propagate::{propagate, Edge};

/// A complete or partial mapping from instance index to its chosen
/// candidate.
pub type Assignment = HashMap<usize, Candidate>;

pub enum SearchResult {
    Solved(Assignment),
    Infeasible { partial: Assignment },
    BudgetExhausted { partial: Assignment },
}

/// Population variance of per-day total scheduled minutes — the workload
/// score spec.md §4.10 step 4 names. Lower is better (load spread evenly).
pub fn workload_score(instances: &[Instance], assignment: &Assignment) -> f64 {
    let mut totals: HashMap<CalendarDate, i64> = HashMap::new();
    for (idx, candidate) in assignment {
        let instance = &instances[*idx];
        if instance.all_day {
            continue;
        }
        let date = candidate.resolve_date(instance.base_date);
        *totals.entry(date).or_insert(0) += instance.duration_minutes.unwrap_or(0) as i64;
    }
    if totals.is_empty() {
        return 0.0;
    }
    let values: Vec<f64> = totals.values().map(|v| *v as f64).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Backtracking search entry point. `budget` bounds the number of
/// assignment attempts (search nodes) explored.
pub fn search(instances: &mut [Instance], edges: &[Edge], budget: usize) -> SearchResult {
    let mut assignment = Assignment::new();
    let mut remaining_budget = budget;
    match backtrack(instances, edges, &mut assignment, &mut remaining_budget) {
        Ok(true) => SearchResult::Solved(assignment),
        Ok(false) => SearchResult::Infeasible { partial: assignment },
        Err(()) => SearchResult::BudgetExhausted { partial: assignment },
    }
}

fn backtrack(
    instances: &mut [Instance],
    edges: &[Edge],
    assignment: &mut Assignment,
    budget: &mut usize,
) -> Result<bool, ()> {
    let Some(next) = select_unassigned(instances, assignment) else {
        return Ok(true);
    };

    if *budget == 0 {
        return Err(());
    }

    let candidates = order_by_lcv(instances, next, edges, assignment);
    let saved_domains: Vec<Vec<Candidate>> = instances.iter().map(|i| i.domain.clone()).collect();

    for candidate in candidates {
        if *budget == 0 {
            return Err(());
        }
        *budget -= 1;

        if overlaps_existing(instances, assignment, next, candidate) {
            continue;
        }

        instances[next].domain = vec![candidate];
        assignment.insert(next, candidate);

        let mut trial: Vec<Instance> = instances.to_vec();
        let consistent = propagate(&mut trial, edges);
        if consistent {
            for (i, inst) in trial.iter().enumerate() {
                instances[i].domain = inst.domain.clone();
            }
            match backtrack(instances, edges, assignment, budget) {
                Ok(true) => return Ok(true),
                Err(()) => return Err(()),
                Ok(false) => {}
            }
        }

        assignment.remove(&next);
        for (i, dom) in saved_domains.iter().enumerate() {
            instances[i].domain = dom.clone();
        }
    }
    Ok(false)
}

/// No two non-all-day instances may overlap in `[start, end)` (spec.md
/// §4.10 step 5). Pruning this during search, not just post-hoc, keeps the
/// backtracker from reporting a spurious conflict when an overlap-free
/// assignment exists elsewhere in the domain.
fn overlaps_existing(
    instances: &[Instance],
    assignment: &Assignment,
    index: usize,
    candidate: Candidate,
) -> bool {
    let instance = &instances[index];
    if instance.all_day {
        return false;
    }
    let date = candidate.resolve_date(instance.base_date);
    let start = candidate.start_minutes;
    let end = start + instance.duration_minutes.unwrap_or(0) as i64;

    assignment.iter().any(|(&other_idx, other_candidate)| {
        if other_idx == index {
            return false;
        }
        let other = &instances[other_idx];
        if other.all_day {
            return false;
        }
        if other_candidate.resolve_date(other.base_date) != date {
            return false;
        }
        let other_start = other_candidate.start_minutes;
        let other_end = other_start + other.duration_minutes.unwrap_or(0) as i64;
        start < other_end && other_start < end
    })
}

/// Minimum-remaining-values: the unassigned instance with the smallest
/// domain, stable-tie-broken by instance index (which is itself derived from
/// a lexicographic (seriesId, date, startTime) ordering upstream).
fn select_unassigned(instances: &[Instance], assignment: &Assignment) -> Option<usize> {
    (0..instances.len())
        .filter(|i| !assignment.contains_key(i))
        .min_by_key(|&i| instances[i].domain.len())
}

/// Least-constraining-value: order `instance`'s candidates by how many
/// neighbor-domain values they would rule out, ascending; ties broken by the
/// workload-score delta adding the candidate would introduce, then by the
/// candidate's own (dayOffset, startMinutes) for determinism.
fn order_by_lcv(
    instances: &[Instance],
    index: usize,
    edges: &[Edge],
    assignment: &Assignment,
) -> Vec<Candidate> {
    let neighbors: Vec<usize> = edges
        .iter()
        .filter(|e| e.a == index || e.b == index)
        .map(|e| if e.a == index { e.b } else { e.a })
        .collect();

    let mut scored: Vec<(usize, f64, Candidate)> = instances[index]
        .domain
        .iter()
        .map(|&candidate| {
            let mut ruled_out = 0usize;
            for &n in &neighbors {
                if assignment.contains_key(&n) {
                    continue;
                }
                ruled_out += instances[n].domain.len();
            }
            let mut trial_assignment = assignment.clone();
            trial_assignment.insert(index, candidate);
            let score = workload_score(instances, &trial_assignment);
            (ruled_out, score, candidate)
        })
        .collect();

    scored.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.2.cmp(&b.2))
    });
    scored.into_iter().map(|(_, _, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConstraintType;
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
    fn solves_a_simple_two_instance_problem() {
        let mut instances = vec![instance(vec![540, 600]), instance(vec![540, 600])];
        let edges = vec![Edge { a: 0, b: 1, kind: ConstraintType::CantBeNextTo }];
        match search(&mut instances, &edges, 1000) {
            SearchResult::Solved(assignment) => assert_eq!(assignment.len(), 2),
            _ => panic!("expected a solution"),
        }
    }

    #[test]
    fn reports_infeasible_when_no_assignment_satisfies_constraints() {
        let mut instances = vec![instance(vec![540]), instance(vec![540])];
        let edges = vec![Edge { a: 0, b: 1, kind: ConstraintType::CantBeOnSameDay }];
        match search(&mut instances, &edges, 1000) {
            SearchResult::Infeasible { .. } => {}
            _ => panic!("expected infeasibility"),
        }
    }

    #[test]
    fn budget_of_zero_exhausts_immediately_when_work_remains() {
        let mut instances = vec![instance(vec![540, 600])];
        match search(&mut instances, &[], 0) {
            SearchResult::BudgetExhausted { .. } => {}
            _ => panic!("expected budget exhaustion"),
        }
    }
}
