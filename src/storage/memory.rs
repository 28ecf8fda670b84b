//! In-memory snapshot-copy `Storage` implementation used by tests. Must
//! stay faithful to the cascade/restrict matrix spec.md §4.3 defines, since
//! tests assert against it directly rather than against a real database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::condition::{Condition, ConditionRow};
use crate::error::CoreError;
use crate::models::{
    AdaptiveDurationConfig, Completion, CyclingConfig, InstanceException, Link, Reminder,
    ReminderAck, RelationalConstraint, Series, Tag,
};
use crate::pattern::PatternRecord;
use crate::time::CalendarDate;

use super::{
    AdaptiveDurationStore, CompletionStore, ConditionStore, ConstraintStore, CyclingStore,
    DurationWindow, ExceptionStore, LinkStore, PatternStore, ReminderStore, SeriesStore, TagStore,
};

#[derive(Default, Clone)]
struct Snapshot {
    series: HashMap<Uuid, Series>,
    patterns: HashMap<Uuid, PatternRecord>,
    conditions: HashMap<Uuid, Vec<ConditionRow>>,
    completions: HashMap<Uuid, Completion>,
    exceptions: HashMap<(Uuid, CalendarDate), InstanceException>,
    reminders: HashMap<Uuid, Reminder>,
    reminder_acks: HashMap<(Uuid, CalendarDate), ReminderAck>,
    cycling: HashMap<Uuid, CyclingConfig>,
    adaptive_duration: HashMap<Uuid, AdaptiveDurationConfig>,
    links: HashMap<Uuid, Link>, // keyed by child_series_id, at most one parent per child
    constraints: HashMap<Uuid, RelationalConstraint>,
    tags: HashMap<Uuid, Tag>,
    series_tags: Vec<(Uuid, Uuid)>,
}

/// An in-memory store guarded by a single mutex. `run_transaction` clones
/// the snapshot, runs the closure against the clone, and only commits the
/// clone back on success — giving the same rollback-to-exact-prior-state
/// guarantee spec.md §5 requires without any real WAL.
pub struct MemoryStorage {
    state: Mutex<Snapshot>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            state: Mutex::new(Snapshot::default()),
        }
    }

    /// Run `f` against a private clone of the current state; on `Ok` the
    /// clone replaces the live state, on `Err` the live state is untouched.
    pub async fn run_transaction<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut MemoryTxn) -> Result<T, CoreError>,
    {
        let mut guard = self.state.lock().await;
        let mut txn = MemoryTxn {
            snapshot: guard.clone(),
        };
        let result = f(&mut txn)?;
        *guard = txn.snapshot;
        Ok(result)
    }
}

/// A handle into a snapshot clone, mutated in place by transaction closures.
pub struct MemoryTxn {
    snapshot: Snapshot,
}

impl MemoryTxn {
    fn delete_series_cascade(&mut self, id: Uuid) -> Result<(), CoreError> {
        let has_completion = self.snapshot.completions.values().any(|c| c.series_id == id);
        if has_completion {
            return Err(CoreError::CompletionsExist(id.to_string()));
        }
        let is_linked_parent = self.snapshot.links.values().any(|l| l.parent_series_id == id);
        if is_linked_parent {
            return Err(CoreError::LinkedChildrenExist(id.to_string()));
        }
        self.snapshot.series.remove(&id);
        self.snapshot.patterns.retain(|_, p| p.series_id != id);
        self.snapshot.conditions.remove(&id);
        self.snapshot.exceptions.retain(|(sid, _), _| *sid != id);
        let reminder_ids: Vec<Uuid> = self
            .snapshot
            .reminders
            .values()
            .filter(|r| r.series_id == id)
            .map(|r| r.id)
            .collect();
        self.snapshot.reminders.retain(|_, r| r.series_id != id);
        self.snapshot
            .reminder_acks
            .retain(|(rid, _), _| !reminder_ids.contains(rid));
        self.snapshot.cycling.remove(&id);
        self.snapshot.adaptive_duration.remove(&id);
        self.snapshot.links.remove(&id);
        self.snapshot.series_tags.retain(|(sid, _)| *sid != id);
        Ok(())
    }
}

#[async_trait]
impl SeriesStore for MemoryStorage {
    async fn create_series(&self, series: &Series) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        if guard.series.contains_key(&series.id) {
            return Err(CoreError::DuplicateKey(series.id.to_string()));
        }
        guard.series.insert(series.id, series.clone());
        Ok(())
    }

    async fn get_series(&self, id: Uuid) -> Result<Series, CoreError> {
        let guard = self.state.lock().await;
        guard
            .series
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    async fn update_series(&self, series: &Series) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        if !guard.series.contains_key(&series.id) {
            return Err(CoreError::NotFound(series.id.to_string()));
        }
        guard.series.insert(series.id, series.clone());
        Ok(())
    }

    async fn delete_series(&self, id: Uuid) -> Result<(), CoreError> {
        self.run_transaction(|txn| txn.delete_series_cascade(id))
            .await
    }

    async fn list_series(&self) -> Result<Vec<Series>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard.series.values().cloned().collect())
    }
}

#[async_trait]
impl PatternStore for MemoryStorage {
    async fn create_pattern(&self, pattern: &PatternRecord) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.patterns.insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn get_patterns_for_series(&self, series_id: Uuid) -> Result<Vec<PatternRecord>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .patterns
            .values()
            .filter(|p| p.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn delete_patterns_for_series(&self, series_id: Uuid) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.patterns.retain(|_, p| p.series_id != series_id);
        Ok(())
    }
}

#[async_trait]
impl ConditionStore for MemoryStorage {
    async fn create_condition(&self, series_id: Uuid, condition: &Condition) -> Result<Uuid, CoreError> {
        let rows = crate::condition::flatten(series_id, condition);
        let root_id = rows
            .iter()
            .find(|r| r.parent_id.is_none())
            .map(|r| r.id)
            .ok_or_else(|| CoreError::InvalidCondition("flattened tree has no root".into()))?;
        let mut guard = self.state.lock().await;
        guard.conditions.insert(series_id, rows);
        Ok(root_id)
    }

    async fn get_condition_rows(&self, series_id: Uuid) -> Result<Vec<ConditionRow>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard.conditions.get(&series_id).cloned().unwrap_or_default())
    }

    async fn delete_condition(&self, series_id: Uuid) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.conditions.remove(&series_id);
        Ok(())
    }
}

#[async_trait]
impl CompletionStore for MemoryStorage {
    async fn log_completion(&self, completion: &Completion) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        let dup = guard.completions.values().any(|c| {
            c.series_id == completion.series_id && c.instance_date == completion.instance_date
        });
        if dup {
            return Err(CoreError::DuplicateCompletion {
                series_id: completion.series_id.to_string(),
                instance_date: completion.instance_date.format(),
            });
        }
        guard.completions.insert(completion.id, completion.clone());
        Ok(())
    }

    async fn get_completions_for_series(&self, series_id: Uuid) -> Result<Vec<Completion>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .completions
            .values()
            .filter(|c| c.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn count_completions_in_window(
        &self,
        series_id: Uuid,
        as_of: CalendarDate,
        window_days: u32,
    ) -> Result<i64, CoreError> {
        let guard = self.state.lock().await;
        let floor = as_of.sub_days(window_days as i64);
        Ok(guard
            .completions
            .values()
            .filter(|c| {
                c.series_id == series_id && c.instance_date > floor && c.instance_date <= as_of
            })
            .count() as i64)
    }

    async fn days_since_last_completion(
        &self,
        series_id: Uuid,
        as_of: CalendarDate,
    ) -> Result<Option<i64>, CoreError> {
        let guard = self.state.lock().await;
        let last = guard
            .completions
            .values()
            .filter(|c| c.series_id == series_id && c.instance_date <= as_of)
            .map(|c| c.instance_date)
            .max();
        Ok(last.map(|d| d.days_between(&as_of)))
    }

    async fn get_recent_durations(
        &self,
        series_id: Uuid,
        window: DurationWindow,
    ) -> Result<Vec<u32>, CoreError> {
        let guard = self.state.lock().await;
        let mut matching: Vec<&Completion> = guard
            .completions
            .values()
            .filter(|c| c.series_id == series_id && c.start.is_some() && c.end.is_some())
            .collect();
        matching.sort_by_key(|c| c.instance_date);
        let durations = |c: &&Completion| -> u32 {
            let start = c.start.unwrap();
            let end = c.end.unwrap();
            start.minutes_between(&end).max(0) as u32
        };
        match window {
            DurationWindow::LastN(n) => {
                matching.reverse();
                Ok(matching.into_iter().take(n as usize).map(|c| durations(&c)).collect())
            }
            DurationWindow::WindowDays { window_days, as_of } => {
                let floor = as_of.sub_days(window_days as i64);
                Ok(matching
                    .into_iter()
                    .filter(|c| c.instance_date > floor && c.instance_date <= as_of)
                    .map(|c| durations(&c))
                    .collect())
            }
        }
    }
}

#[async_trait]
impl ExceptionStore for MemoryStorage {
    async fn upsert_exception(&self, exception: &InstanceException) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.exceptions.insert(
            (exception.series_id, exception.original_date),
            exception.clone(),
        );
        Ok(())
    }

    async fn get_exceptions_for_series(&self, series_id: Uuid) -> Result<Vec<InstanceException>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .exceptions
            .values()
            .filter(|e| e.series_id == series_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReminderStore for MemoryStorage {
    async fn create_reminder(&self, reminder: &Reminder) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.reminders.insert(reminder.id, reminder.clone());
        Ok(())
    }

    async fn get_reminders_for_series(&self, series_id: Uuid) -> Result<Vec<Reminder>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .reminders
            .values()
            .filter(|r| r.series_id == series_id)
            .cloned()
            .collect())
    }

    async fn ack_reminder(&self, ack: &ReminderAck) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard
            .reminder_acks
            .insert((ack.reminder_id, ack.instance_date), ack.clone());
        Ok(())
    }

    async fn get_acks_for_reminder(&self, reminder_id: Uuid) -> Result<Vec<ReminderAck>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .reminder_acks
            .values()
            .filter(|a| a.reminder_id == reminder_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CyclingStore for MemoryStorage {
    async fn upsert_cycling(&self, config: &CyclingConfig) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.cycling.insert(config.series_id, config.clone());
        Ok(())
    }

    async fn get_cycling(&self, series_id: Uuid) -> Result<Option<CyclingConfig>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard.cycling.get(&series_id).cloned())
    }
}

#[async_trait]
impl AdaptiveDurationStore for MemoryStorage {
    async fn upsert_adaptive_duration(&self, config: &AdaptiveDurationConfig) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.adaptive_duration.insert(config.series_id, *config);
        Ok(())
    }

    async fn get_adaptive_duration(&self, series_id: Uuid) -> Result<Option<AdaptiveDurationConfig>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard.adaptive_duration.get(&series_id).copied())
    }
}

#[async_trait]
impl LinkStore for MemoryStorage {
    async fn create_link(&self, link: &Link) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        if guard.links.contains_key(&link.child_series_id) {
            return Err(CoreError::DuplicateKey(format!(
                "child {} already has a parent link",
                link.child_series_id
            )));
        }
        guard.links.insert(link.child_series_id, *link);
        Ok(())
    }

    async fn get_link_for_child(&self, child_series_id: Uuid) -> Result<Option<Link>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard.links.get(&child_series_id).copied())
    }

    async fn get_links_for_parent(&self, parent_series_id: Uuid) -> Result<Vec<Link>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .links
            .values()
            .filter(|l| l.parent_series_id == parent_series_id)
            .copied()
            .collect())
    }

    async fn get_all_links(&self) -> Result<Vec<Link>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard.links.values().copied().collect())
    }

    async fn delete_link(&self, child_series_id: Uuid) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.links.remove(&child_series_id);
        Ok(())
    }
}

#[async_trait]
impl ConstraintStore for MemoryStorage {
    async fn create_constraint(&self, constraint: &RelationalConstraint) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.constraints.insert(constraint.id, *constraint);
        Ok(())
    }

    async fn get_all_constraints(&self) -> Result<Vec<RelationalConstraint>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard.constraints.values().copied().collect())
    }

    async fn delete_constraint(&self, id: Uuid) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard
            .constraints
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl TagStore for MemoryStorage {
    async fn create_tag(&self, tag: &Tag) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        if guard.tags.values().any(|t| t.name == tag.name) {
            return Err(CoreError::DuplicateKey(tag.name.clone()));
        }
        guard.tags.insert(tag.id, tag.clone());
        Ok(())
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        guard.tags.remove(&id);
        guard.series_tags.retain(|(_, tid)| *tid != id);
        Ok(())
    }

    async fn tag_series(&self, series_id: Uuid, tag_id: Uuid) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        if !guard.series_tags.contains(&(series_id, tag_id)) {
            guard.series_tags.push((series_id, tag_id));
        }
        Ok(())
    }

    async fn get_tags_for_series(&self, series_id: Uuid) -> Result<Vec<Tag>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .series_tags
            .iter()
            .filter(|(sid, _)| *sid == series_id)
            .filter_map(|(_, tid)| guard.tags.get(tid).cloned())
            .collect())
    }

    async fn get_series_for_tag(&self, tag_id: Uuid) -> Result<Vec<Uuid>, CoreError> {
        let guard = self.state.lock().await;
        Ok(guard
            .series_tags
            .iter()
            .filter(|(_, tid)| *tid == tag_id)
            .map(|(sid, _)| *sid)
            .collect())
    }
}
