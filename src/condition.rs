//! Condition trees: boolean predicates that gate whether an expanded
//! pattern date becomes a real instance. Stored flat with parent pointers
//! (spec.md §4.5); reconstructed into a nested tree for evaluation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::time::{CalendarDate, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
}

impl Comparison {
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparison::LessThan => lhs < rhs,
            Comparison::LessOrEqual => lhs <= rhs,
            Comparison::GreaterThan => lhs > rhs,
            Comparison::GreaterOrEqual => lhs >= rhs,
            Comparison::Equal => lhs == rhs,
        }
    }
}

/// A condition tree node. Leaves are predicates evaluated against store
/// state; internal nodes are boolean combinators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    CompletionCount {
        series_ref: Uuid,
        window_days: u32,
        comparison: Comparison,
        value: i64,
    },
    Weekday(Vec<Weekday>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

/// A flat storage row for one condition node, as spec.md §4.5 describes:
/// every node gets a fresh id, with `parent_id` pointing at its parent's
/// newly assigned id (`None` for the root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConditionRow {
    pub id: Uuid,
    pub series_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub kind: String,
    /// Kind-specific payload: completion-count fields, weekday list (JSON
    /// array of 1..=7), or empty for pure combinators.
    pub series_ref: Option<Uuid>,
    pub window_days: Option<i64>,
    pub comparison: Option<String>,
    pub value: Option<i64>,
    pub days_json: Option<String>,
}

const KIND_COMPLETION_COUNT: &str = "completion_count";
const KIND_WEEKDAY: &str = "weekday";
const KIND_AND: &str = "and";
const KIND_OR: &str = "or";
const KIND_NOT: &str = "not";

fn comparison_to_str(c: Comparison) -> &'static str {
    match c {
        Comparison::LessThan => "lt",
        Comparison::LessOrEqual => "le",
        Comparison::GreaterThan => "gt",
        Comparison::GreaterOrEqual => "ge",
        Comparison::Equal => "eq",
    }
}

fn comparison_from_str(s: &str) -> Result<Comparison, CoreError> {
    match s {
        "lt" => Ok(Comparison::LessThan),
        "le" => Ok(Comparison::LessOrEqual),
        "gt" => Ok(Comparison::GreaterThan),
        "ge" => Ok(Comparison::GreaterOrEqual),
        "eq" => Ok(Comparison::Equal),
        other => Err(CoreError::InvalidCondition(format!(
            "unknown comparison '{other}'"
        ))),
    }
}

/// Depth-first flattening: assign each node a fresh id, write it with
/// `parent_id` pointing to its parent's freshly assigned id.
pub fn flatten(series_id: Uuid, condition: &Condition) -> Vec<ConditionRow> {
    let mut rows = Vec::new();
    flatten_into(series_id, condition, None, &mut rows);
    rows
}

fn flatten_into(
    series_id: Uuid,
    condition: &Condition,
    parent_id: Option<Uuid>,
    rows: &mut Vec<ConditionRow>,
) -> Uuid {
    let id = Uuid::new_v4();
    match condition {
        Condition::CompletionCount {
            series_ref,
            window_days,
            comparison,
            value,
        } => {
            rows.push(ConditionRow {
                id,
                series_id,
                parent_id,
                kind: KIND_COMPLETION_COUNT.to_string(),
                series_ref: Some(*series_ref),
                window_days: Some(*window_days as i64),
                comparison: Some(comparison_to_str(*comparison).to_string()),
                value: Some(*value),
                days_json: None,
            });
        }
        Condition::Weekday(days) => {
            let nums: Vec<u8> = days.iter().map(|d| d.number()).collect();
            rows.push(ConditionRow {
                id,
                series_id,
                parent_id,
                kind: KIND_WEEKDAY.to_string(),
                series_ref: None,
                window_days: None,
                comparison: None,
                value: None,
                days_json: Some(serde_json::to_string(&nums).expect("weekday list serializes")),
            });
        }
        Condition::And(children) => {
            rows.push(ConditionRow {
                id,
                series_id,
                parent_id,
                kind: KIND_AND.to_string(),
                series_ref: None,
                window_days: None,
                comparison: None,
                value: None,
                days_json: None,
            });
            for child in children {
                flatten_into(series_id, child, Some(id), rows);
            }
        }
        Condition::Or(children) => {
            rows.push(ConditionRow {
                id,
                series_id,
                parent_id,
                kind: KIND_OR.to_string(),
                series_ref: None,
                window_days: None,
                comparison: None,
                value: None,
                days_json: None,
            });
            for child in children {
                flatten_into(series_id, child, Some(id), rows);
            }
        }
        Condition::Not(inner) => {
            rows.push(ConditionRow {
                id,
                series_id,
                parent_id,
                kind: KIND_NOT.to_string(),
                series_ref: None,
                window_days: None,
                comparison: None,
                value: None,
                days_json: None,
            });
            flatten_into(series_id, inner, Some(id), rows);
        }
    }
    id
}

/// Reconstruct a nested `Condition` tree from flat rows: build id→node and
/// parent_id→children maps, find the root (the row with `parent_id: None`),
/// and rebuild recursively. Storage-only fields (id, series_id, parent_id)
/// are stripped from the returned domain shape.
pub fn unflatten(rows: &[ConditionRow]) -> Result<Condition, CoreError> {
    if rows.is_empty() {
        return Err(CoreError::InvalidCondition(
            "condition tree has no rows".into(),
        ));
    }
    let by_id: HashMap<Uuid, &ConditionRow> = rows.iter().map(|r| (r.id, r)).collect();
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut root = None;
    for row in rows {
        match row.parent_id {
            Some(pid) => children.entry(pid).or_default().push(row.id),
            None => {
                if root.is_some() {
                    return Err(CoreError::InvalidCondition(
                        "condition tree has more than one root".into(),
                    ));
                }
                root = Some(row.id);
            }
        }
    }
    let root = root.ok_or_else(|| CoreError::InvalidCondition("condition tree has no root".into()))?;
    check_acyclic(&by_id, root)?;
    build_node(&by_id, &children, root)
}

fn check_acyclic(by_id: &HashMap<Uuid, &ConditionRow>, root: Uuid) -> Result<(), CoreError> {
    // A node must never be its own ancestor. Since rows form a parent_id
    // pointer graph, a cycle means following parent_id from some node
    // eventually returns to itself without reaching None.
    for (&id, _) in by_id.iter() {
        let mut seen = std::collections::HashSet::new();
        let mut current = id;
        loop {
            if !seen.insert(current) {
                return Err(CoreError::InvalidCondition(format!(
                    "condition node {current} is its own ancestor"
                )));
            }
            match by_id.get(&current).and_then(|r| r.parent_id) {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }
    let _ = root;
    Ok(())
}

fn build_node(
    by_id: &HashMap<Uuid, &ConditionRow>,
    children: &HashMap<Uuid, Vec<Uuid>>,
    id: Uuid,
) -> Result<Condition, CoreError> {
    let row = by_id
        .get(&id)
        .ok_or_else(|| CoreError::InvalidCondition(format!("dangling condition id {id}")))?;
    match row.kind.as_str() {
        KIND_COMPLETION_COUNT => {
            let series_ref = row
                .series_ref
                .ok_or_else(|| CoreError::InvalidCondition("missing series_ref".into()))?;
            let window_days = row
                .window_days
                .ok_or_else(|| CoreError::InvalidCondition("missing window_days".into()))?
                as u32;
            let comparison = comparison_from_str(
                row.comparison
                    .as_deref()
                    .ok_or_else(|| CoreError::InvalidCondition("missing comparison".into()))?,
            )?;
            let value = row
                .value
                .ok_or_else(|| CoreError::InvalidCondition("missing value".into()))?;
            Ok(Condition::CompletionCount {
                series_ref,
                window_days,
                comparison,
                value,
            })
        }
        KIND_WEEKDAY => {
            let json = row
                .days_json
                .as_deref()
                .ok_or_else(|| CoreError::InvalidCondition("missing days_json".into()))?;
            let nums: Vec<u8> = serde_json::from_str(json)
                .map_err(|e| CoreError::InvalidCondition(format!("bad days_json: {e}")))?;
            let days = nums
                .into_iter()
                .map(number_to_weekday)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::Weekday(days))
        }
        KIND_AND => {
            let kids = children.get(&id).cloned().unwrap_or_default();
            let nodes = kids
                .into_iter()
                .map(|cid| build_node(by_id, children, cid))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::And(nodes))
        }
        KIND_OR => {
            let kids = children.get(&id).cloned().unwrap_or_default();
            let nodes = kids
                .into_iter()
                .map(|cid| build_node(by_id, children, cid))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::Or(nodes))
        }
        KIND_NOT => {
            let kids = children.get(&id).cloned().unwrap_or_default();
            let only = kids
                .first()
                .copied()
                .ok_or_else(|| CoreError::InvalidCondition("not node has no child".into()))?;
            Ok(Condition::Not(Box::new(build_node(by_id, children, only)?)))
        }
        other => Err(CoreError::InvalidCondition(format!(
            "unknown condition kind '{other}'"
        ))),
    }
}

fn number_to_weekday(n: u8) -> Result<Weekday, CoreError> {
    match n {
        1 => Ok(Weekday::Monday),
        2 => Ok(Weekday::Tuesday),
        3 => Ok(Weekday::Wednesday),
        4 => Ok(Weekday::Thursday),
        5 => Ok(Weekday::Friday),
        6 => Ok(Weekday::Saturday),
        7 => Ok(Weekday::Sunday),
        other => Err(CoreError::InvalidCondition(format!(
            "invalid weekday number {other}"
        ))),
    }
}

/// Store access a condition leaf needs to evaluate `completionCount`.
/// Kept minimal and separate from the full `Storage` trait so condition
/// evaluation can be tested without a whole storage backend.
#[async_trait]
pub trait CompletionHistory {
    async fn completion_count_in_window(
        &self,
        series_id: Uuid,
        as_of: CalendarDate,
        window_days: u32,
    ) -> Result<i64, CoreError>;
}

/// Evaluate a condition tree against `date`, consulting `history` for
/// completion-count leaves. Pure given the history snapshot passed in.
pub async fn evaluate(
    condition: &Condition,
    date: CalendarDate,
    history: &dyn CompletionHistory,
) -> Result<bool, CoreError> {
    match condition {
        Condition::CompletionCount {
            series_ref,
            window_days,
            comparison,
            value,
        } => {
            let count = history
                .completion_count_in_window(*series_ref, date, *window_days)
                .await?;
            Ok(comparison.holds(count, *value))
        }
        Condition::Weekday(days) => Ok(days.contains(&date.weekday())),
        Condition::And(children) => {
            for child in children {
                if !Box::pin(evaluate(child, date, history)).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(children) => {
            for child in children {
                if Box::pin(evaluate(child, date, history)).await? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not(inner) => Ok(!Box::pin(evaluate(inner, date, history)).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHistory(i64);

    #[async_trait]
    impl CompletionHistory for FakeHistory {
        async fn completion_count_in_window(
            &self,
            _series_id: Uuid,
            _as_of: CalendarDate,
            _window_days: u32,
        ) -> Result<i64, CoreError> {
            Ok(self.0)
        }
    }

    #[test]
    fn flatten_then_unflatten_round_trips() {
        let series_id = Uuid::new_v4();
        let tree = Condition::And(vec![
            Condition::Weekday(vec![Weekday::Monday, Weekday::Tuesday]),
            Condition::Not(Box::new(Condition::CompletionCount {
                series_ref: Uuid::new_v4(),
                window_days: 30,
                comparison: Comparison::GreaterOrEqual,
                value: 3,
            })),
        ]);
        let rows = flatten(series_id, &tree);
        let rebuilt = unflatten(&rows).unwrap();
        assert_eq!(tree, rebuilt);
    }

    #[test]
    fn no_node_is_its_own_ancestor() {
        let series_id = Uuid::new_v4();
        let tree = Condition::Or(vec![Condition::Weekday(vec![Weekday::Sunday])]);
        let rows = flatten(series_id, &tree);
        assert!(check_acyclic(
            &rows.iter().map(|r| (r.id, r)).collect(),
            rows[0].id
        )
        .is_ok());
    }

    #[tokio::test]
    async fn weekday_condition_evaluates_against_date() {
        let history = FakeHistory(0);
        let cond = Condition::Weekday(vec![Weekday::Monday]);
        let monday = CalendarDate::parse("2024-01-01").unwrap();
        let tuesday = CalendarDate::parse("2024-01-02").unwrap();
        assert!(evaluate(&cond, monday, &history).await.unwrap());
        assert!(!evaluate(&cond, tuesday, &history).await.unwrap());
    }

    #[tokio::test]
    async fn completion_count_condition_uses_history() {
        let history = FakeHistory(5);
        let cond = Condition::CompletionCount {
            series_ref: Uuid::new_v4(),
            window_days: 30,
            comparison: Comparison::GreaterOrEqual,
            value: 3,
        };
        let date = CalendarDate::parse("2024-01-01").unwrap();
        assert!(evaluate(&cond, date, &history).await.unwrap());
    }
}
