//! Series links (spec.md §3/§4.8): a directed parent→child temporal
//! dependency, used to schedule a child instance a fixed distance from its
//! parent's instance, within a wobble tolerance. No direct teacher analog;
//! structured as pure functions over the already-loaded link graph the way
//! `reflow` consumes domain/constraint data, since link evaluation has no
//! storage dependency once the graph is loaded.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{Completion, Link};
use crate::time::LocalDateTime;

/// Maximum parent→child chain depth a link graph may have (spec.md §4.8).
pub const MAX_CHAIN_DEPTH: usize = 32;

/// Verify that adding `candidate` to `existing` links keeps the graph acyclic
/// and within `MAX_CHAIN_DEPTH`. `existing` must already be acyclic.
pub fn validate_new_link(existing: &[Link], candidate: &Link) -> Result<(), CoreError> {
    if candidate.parent_series_id == candidate.child_series_id {
        return Err(CoreError::CycleDetected(format!(
            "series {} cannot link to itself",
            candidate.parent_series_id
        )));
    }
    if existing
        .iter()
        .any(|l| l.child_series_id == candidate.child_series_id)
    {
        return Err(CoreError::Validation(format!(
            "series {} already has a parent link",
            candidate.child_series_id
        )));
    }
    let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for link in existing.iter().chain(std::iter::once(candidate)) {
        children_of
            .entry(link.parent_series_id)
            .or_default()
            .push(link.child_series_id);
    }

    // walk from the candidate's child forward; if we ever reach the
    // candidate's parent again, a cycle has been introduced.
    let mut stack = vec![candidate.child_series_id];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == candidate.parent_series_id {
            return Err(CoreError::CycleDetected(format!(
                "linking {} -> {} would create a cycle",
                candidate.parent_series_id, candidate.child_series_id
            )));
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(children) = children_of.get(&node) {
            stack.extend(children.iter().copied());
        }
    }

    let depth = chain_depth(&children_of, root_of(existing, candidate));
    if depth > MAX_CHAIN_DEPTH {
        return Err(CoreError::ChainDepthExceeded(format!(
            "chain rooted near {} exceeds depth {}",
            candidate.parent_series_id, MAX_CHAIN_DEPTH
        )));
    }
    Ok(())
}

fn root_of(existing: &[Link], candidate: &Link) -> Uuid {
    let children: HashSet<Uuid> = existing
        .iter()
        .chain(std::iter::once(candidate))
        .map(|l| l.child_series_id)
        .collect();
    let mut node = candidate.parent_series_id;
    let parent_of: HashMap<Uuid, Uuid> = existing
        .iter()
        .chain(std::iter::once(candidate))
        .map(|l| (l.child_series_id, l.parent_series_id))
        .collect();
    while children.contains(&node) {
        match parent_of.get(&node) {
            Some(p) => node = *p,
            None => break,
        }
    }
    node
}

fn chain_depth(children_of: &HashMap<Uuid, Vec<Uuid>>, root: Uuid) -> usize {
    fn depth(children_of: &HashMap<Uuid, Vec<Uuid>>, node: Uuid, seen: &mut HashSet<Uuid>) -> usize {
        if !seen.insert(node) {
            return 0;
        }
        children_of
            .get(&node)
            .map(|kids| 1 + kids.iter().map(|k| depth(children_of, *k, seen)).max().unwrap_or(0))
            .unwrap_or(0)
    }
    let mut seen = HashSet::new();
    depth(children_of, root, &mut seen)
}

/// The parent instance's "effective end": its logged completion end time if
/// it has been completed, otherwise its scheduled start plus duration
/// (spec.md §4.8 `calculateChildTarget`). Rescheduling or completing the
/// parent is picked up automatically because callers always re-derive this
/// from current state rather than caching it.
pub fn effective_parent_end(
    scheduled_start: LocalDateTime,
    duration_minutes: u32,
    completion: Option<&Completion>,
) -> LocalDateTime {
    if let Some(end) = completion.and_then(|c| c.end) {
        return end;
    }
    scheduled_start.add_minutes(duration_minutes as i64)
}

/// The child instance's target start time, given the parent's effective end
/// (see [`effective_parent_end`]) and the link's configured distance (may be
/// negative: child before parent).
pub fn calculate_child_target(parent_effective_end: LocalDateTime, link: &Link) -> LocalDateTime {
    parent_effective_end.add_minutes(link.target_distance_minutes)
}

/// The `[earliest, latest]` window the child instance may be placed within,
/// derived from the target plus the link's early/late wobble tolerance.
pub fn child_valid_window(
    parent_effective_end: LocalDateTime,
    link: &Link,
) -> (LocalDateTime, LocalDateTime) {
    let target = calculate_child_target(parent_effective_end, link);
    (
        target.add_minutes(-(link.early_wobble_minutes as i64)),
        target.add_minutes(link.late_wobble_minutes as i64),
    )
}

/// Whether `candidate_start` falls within the child's valid window relative
/// to the parent's effective end.
pub fn satisfies_link(
    parent_effective_end: LocalDateTime,
    candidate_start: LocalDateTime,
    link: &Link,
) -> bool {
    let (earliest, latest) = child_valid_window(parent_effective_end, link);
    candidate_start >= earliest && candidate_start <= latest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(parent: Uuid, child: Uuid) -> Link {
        Link {
            parent_series_id: parent,
            child_series_id: child,
            target_distance_minutes: 60,
            early_wobble_minutes: 15,
            late_wobble_minutes: 15,
        }
    }

    #[test]
    fn self_link_is_rejected() {
        let a = Uuid::new_v4();
        assert!(validate_new_link(&[], &link(a, a)).is_err());
    }

    #[test]
    fn two_hop_cycle_is_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let existing = vec![link(a, b)];
        assert!(validate_new_link(&existing, &link(b, a)).is_err());
    }

    #[test]
    fn acyclic_chain_is_accepted() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let existing = vec![link(a, b)];
        assert!(validate_new_link(&existing, &link(b, c)).is_ok());
    }

    #[test]
    fn child_already_linked_is_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let existing = vec![link(a, b)];
        assert!(validate_new_link(&existing, &link(c, b)).is_err());
    }

    #[test]
    fn parent_completed_early_shifts_child_target() {
        // spec.md §8 scenario 2: parent 09:00-09:30, link targetDistance=15.
        let l = Link {
            target_distance_minutes: 15,
            ..link(Uuid::new_v4(), Uuid::new_v4())
        };
        let scheduled_start = LocalDateTime::parse("2024-01-15T09:00:00").unwrap();
        let no_completion = effective_parent_end(scheduled_start, 30, None);
        assert_eq!(
            calculate_child_target(no_completion, &l).format(),
            "2024-01-15T09:45:00"
        );

        let completion = Completion {
            id: Uuid::new_v4(),
            series_id: Uuid::new_v4(),
            instance_date: crate::time::CalendarDate::parse("2024-01-15").unwrap(),
            actual_date: crate::time::CalendarDate::parse("2024-01-15").unwrap(),
            start: Some(scheduled_start),
            end: Some(LocalDateTime::parse("2024-01-15T09:15:00").unwrap()),
        };
        let early_end = effective_parent_end(scheduled_start, 30, Some(&completion));
        assert_eq!(
            calculate_child_target(early_end, &l).format(),
            "2024-01-15T09:30:00"
        );
    }

    #[test]
    fn target_and_window_follow_distance_and_wobble() {
        let parent_start = LocalDateTime::parse("2024-01-01T09:00:00").unwrap();
        let l = link(Uuid::new_v4(), Uuid::new_v4());
        let target = calculate_child_target(parent_start, &l);
        assert_eq!(target.format(), "2024-01-01T10:00:00");
        let (earliest, latest) = child_valid_window(parent_start, &l);
        assert_eq!(earliest.format(), "2024-01-01T09:45:00");
        assert_eq!(latest.format(), "2024-01-01T10:15:00");
        assert!(satisfies_link(parent_start, target, &l));
    }
}
