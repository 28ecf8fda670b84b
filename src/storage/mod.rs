//! Abstract persistence interface (spec.md §4.3). Grouped by entity, plus
//! cross-cutting query helpers the adaptive-duration and condition-evaluation
//! code pushes down rather than pulling whole tables into memory.
//!
//! Two implementations satisfy this trait: [`memory::MemoryStorage`] (an
//! in-memory snapshot-copy store, used in tests) and
//! [`sqlite::SqliteStorage`] (a real relational store with foreign keys).
//! Both must honor the cascade/restrict matrix in spec.md §4.3.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::condition::{Condition, ConditionRow};
use crate::error::CoreError;
use crate::models::{
    AdaptiveDurationConfig, Completion, CyclingConfig, InstanceException, Link, Reminder,
    ReminderAck, RelationalConstraint, Series, Tag,
};
use crate::pattern::PatternRecord;
use crate::time::CalendarDate;

/// Window spec accepted by `get_recent_durations`: either the last N
/// completions regardless of date, or every completion within a day window
/// as-of a given date.
#[derive(Debug, Clone, Copy)]
pub enum DurationWindow {
    LastN(u32),
    WindowDays { window_days: u32, as_of: CalendarDate },
}

#[async_trait]
pub trait SeriesStore {
    async fn create_series(&self, series: &Series) -> Result<(), CoreError>;
    async fn get_series(&self, id: Uuid) -> Result<Series, CoreError>;
    async fn update_series(&self, series: &Series) -> Result<(), CoreError>;
    async fn delete_series(&self, id: Uuid) -> Result<(), CoreError>;
    async fn list_series(&self) -> Result<Vec<Series>, CoreError>;
}

#[async_trait]
pub trait PatternStore {
    async fn create_pattern(&self, pattern: &PatternRecord) -> Result<(), CoreError>;
    async fn get_patterns_for_series(&self, series_id: Uuid) -> Result<Vec<PatternRecord>, CoreError>;
    async fn delete_patterns_for_series(&self, series_id: Uuid) -> Result<(), CoreError>;
}

#[async_trait]
pub trait ConditionStore {
    async fn create_condition(&self, series_id: Uuid, condition: &Condition) -> Result<Uuid, CoreError>;
    async fn get_condition_rows(&self, series_id: Uuid) -> Result<Vec<ConditionRow>, CoreError>;
    async fn delete_condition(&self, series_id: Uuid) -> Result<(), CoreError>;
}

#[async_trait]
pub trait CompletionStore {
    async fn log_completion(&self, completion: &Completion) -> Result<(), CoreError>;
    async fn get_completions_for_series(&self, series_id: Uuid) -> Result<Vec<Completion>, CoreError>;
    async fn count_completions_in_window(
        &self,
        series_id: Uuid,
        as_of: CalendarDate,
        window_days: u32,
    ) -> Result<i64, CoreError>;
    async fn days_since_last_completion(
        &self,
        series_id: Uuid,
        as_of: CalendarDate,
    ) -> Result<Option<i64>, CoreError>;
    async fn get_recent_durations(
        &self,
        series_id: Uuid,
        window: DurationWindow,
    ) -> Result<Vec<u32>, CoreError>;
}

#[async_trait]
pub trait ExceptionStore {
    async fn upsert_exception(&self, exception: &InstanceException) -> Result<(), CoreError>;
    async fn get_exceptions_for_series(&self, series_id: Uuid) -> Result<Vec<InstanceException>, CoreError>;
}

#[async_trait]
pub trait ReminderStore {
    async fn create_reminder(&self, reminder: &Reminder) -> Result<(), CoreError>;
    async fn get_reminders_for_series(&self, series_id: Uuid) -> Result<Vec<Reminder>, CoreError>;
    async fn ack_reminder(&self, ack: &ReminderAck) -> Result<(), CoreError>;
    async fn get_acks_for_reminder(&self, reminder_id: Uuid) -> Result<Vec<ReminderAck>, CoreError>;
}

#[async_trait]
pub trait CyclingStore {
    async fn upsert_cycling(&self, config: &CyclingConfig) -> Result<(), CoreError>;
    async fn get_cycling(&self, series_id: Uuid) -> Result<Option<CyclingConfig>, CoreError>;
}

#[async_trait]
pub trait AdaptiveDurationStore {
    async fn upsert_adaptive_duration(&self, config: &AdaptiveDurationConfig) -> Result<(), CoreError>;
    async fn get_adaptive_duration(&self, series_id: Uuid) -> Result<Option<AdaptiveDurationConfig>, CoreError>;
}

#[async_trait]
pub trait LinkStore {
    async fn create_link(&self, link: &Link) -> Result<(), CoreError>;
    async fn get_link_for_child(&self, child_series_id: Uuid) -> Result<Option<Link>, CoreError>;
    async fn get_links_for_parent(&self, parent_series_id: Uuid) -> Result<Vec<Link>, CoreError>;
    async fn get_all_links(&self) -> Result<Vec<Link>, CoreError>;
    async fn delete_link(&self, child_series_id: Uuid) -> Result<(), CoreError>;
}

#[async_trait]
pub trait ConstraintStore {
    async fn create_constraint(&self, constraint: &RelationalConstraint) -> Result<(), CoreError>;
    async fn get_all_constraints(&self) -> Result<Vec<RelationalConstraint>, CoreError>;
    async fn delete_constraint(&self, id: Uuid) -> Result<(), CoreError>;
}

#[async_trait]
pub trait TagStore {
    async fn create_tag(&self, tag: &Tag) -> Result<(), CoreError>;
    async fn delete_tag(&self, id: Uuid) -> Result<(), CoreError>;
    async fn tag_series(&self, series_id: Uuid, tag_id: Uuid) -> Result<(), CoreError>;
    async fn get_tags_for_series(&self, series_id: Uuid) -> Result<Vec<Tag>, CoreError>;
    async fn get_series_for_tag(&self, tag_id: Uuid) -> Result<Vec<Uuid>, CoreError>;
}

/// Composition of every per-entity trait, implemented once per backend —
/// mirroring `rusk_core::repository::Repository`'s umbrella-trait pattern.
///
/// Transactional semantics (spec.md §4.3/§5: atomic, snapshot-rollback,
/// nested calls flatten onto the outermost transaction) are intentionally
/// not part of this trait object-safe surface — generic higher-ranked
/// closures over `Self` don't compose with `async_trait`'s object-safety
/// requirements. Each backend instead exposes its own concrete
/// `run_transaction` (see `memory::MemoryStorage::run_transaction`, used by
/// `delete_series_cascade`, and `sqlite::SqliteStorage::run_transaction`),
/// the same way `rusk_core::repository::SqliteRepository` exposes a `pool()`
/// accessor — backend-specific escape hatches for multi-statement work that
/// needs real atomicity, kept separate from the storage-agnostic `series.rs`/
/// `exceptions.rs` call paths that only ever need the trait object.
pub trait Storage:
    SeriesStore
    + PatternStore
    + ConditionStore
    + CompletionStore
    + ExceptionStore
    + ReminderStore
    + CyclingStore
    + AdaptiveDurationStore
    + LinkStore
    + ConstraintStore
    + TagStore
    + Send
    + Sync
{
}

impl<T> Storage for T where
    T: SeriesStore
        + PatternStore
        + ConditionStore
        + CompletionStore
        + ExceptionStore
        + ReminderStore
        + CyclingStore
        + AdaptiveDurationStore
        + LinkStore
        + ConstraintStore
        + TagStore
        + Send
        + Sync
{
}
