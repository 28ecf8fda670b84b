//! Domain entities from spec.md §3. Each tagged union (pattern variants live
//! in `pattern.rs`, condition nodes in `condition.rs`) is a Rust enum; the
//! structs here are the narrow domain shapes, not the flat row encodings —
//! those live next to their `Storage` implementation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::pattern::PatternRecord;
use crate::time::{CalendarDate, LocalDateTime, TimeOfDay};

/// Either a concrete time-of-day or the "all-day" sentinel. Spec invariant:
/// `time_of_day` is all-day iff `duration` is all-day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeSpec {
    AllDay,
    At(TimeOfDay),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DurationSpec {
    AllDay,
    Minutes(u32),
    Adaptive,
}

/// Per-series wiggle window: how far an instance may drift from its
/// pattern-expanded date/time, feeding the reflow engine's domain
/// generation (§4.10 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wiggle {
    pub days_before: u32,
    pub days_after: u32,
    pub earliest: Option<TimeOfDay>,
    pub latest: Option<TimeOfDay>,
}

impl Wiggle {
    pub fn none() -> Self {
        Wiggle {
            days_before: 0,
            days_after: 0,
            earliest: None,
            latest: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if let (Some(e), Some(l)) = (self.earliest, self.latest) {
            if e >= l {
                return Err(CoreError::Validation(
                    "wiggle earliest must be before latest".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A recurring activity. See spec.md §3 for the full invariant list;
/// enforced in `series::validate` before any write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: CalendarDate,
    pub end_date: Option<CalendarDate>,
    pub time_of_day: TimeSpec,
    pub duration: DurationSpec,
    pub count: Option<u32>,
    pub created_at: LocalDateTime,
    pub updated_at: LocalDateTime,
    pub locked: bool,
    pub fixed: bool,
    pub wiggle: Wiggle,
}

impl Series {
    /// Check the invariants spec.md §3 states, independent of any single
    /// mutation path — called by both create and update.
    pub fn validate_invariants(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("series title must not be empty".into()));
        }
        if let Some(end) = self.end_date {
            if end <= self.start_date {
                return Err(CoreError::Validation(
                    "series endDate must be after startDate".into(),
                ));
            }
        }
        match (self.time_of_day, self.duration) {
            (TimeSpec::AllDay, DurationSpec::AllDay) => {}
            (TimeSpec::AllDay, _) | (_, DurationSpec::AllDay) => {
                return Err(CoreError::Validation(
                    "timeOfDay=all-day iff duration=all-day".into(),
                ));
            }
            _ => {}
        }
        if let DurationSpec::Minutes(m) = self.duration {
            if m == 0 {
                return Err(CoreError::Validation("duration minutes must be positive".into()));
            }
        }
        if self.count.is_some() && self.end_date.is_some() {
            return Err(CoreError::Validation(
                "count and endDate are mutually exclusive".into(),
            ));
        }
        if let Some(c) = self.count {
            if c < 1 {
                return Err(CoreError::Validation("count must be >= 1".into()));
            }
        }
        if self.fixed && (self.wiggle.days_before != 0 || self.wiggle.days_after != 0) {
            return Err(CoreError::Validation(
                "fixed series must have zero-day wiggle".into(),
            ));
        }
        self.wiggle.validate()?;
        Ok(())
    }
}

/// A logged execution of an instance. RESTRICT on series delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Completion {
    pub id: Uuid,
    pub series_id: Uuid,
    pub instance_date: CalendarDate,
    pub actual_date: CalendarDate,
    pub start: Option<LocalDateTime>,
    pub end: Option<LocalDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionType {
    Cancelled,
    Rescheduled,
}

/// A per-occurrence override. CASCADE with its series. Unique on
/// `(series_id, original_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceException {
    pub series_id: Uuid,
    pub original_date: CalendarDate,
    pub kind: ExceptionType,
    pub new_date: Option<CalendarDate>,
    pub new_time: Option<TimeOfDay>,
}

/// Per-series adaptive-duration configuration (§3). Effective duration is
/// computed in `duration::effective_duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveDurationConfig {
    pub series_id: Uuid,
    pub fallback_duration: u32,
    /// A percentage, not a fraction: 10.0 inflates the mean by 10%.
    /// `duration::effective_minutes` applies it as `mean * (1.0 + buffer_percent/100.0)`.
    pub buffer_percent: f64,
    pub last_n: u32,
    pub window_days: u32,
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl Default for AdaptiveDurationConfig {
    fn default() -> Self {
        AdaptiveDurationConfig {
            series_id: Uuid::nil(),
            fallback_duration: 30,
            buffer_percent: 0.0,
            last_n: 5,
            window_days: 30,
            min: None,
            max: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclingMode {
    Sequential,
    Random,
}

/// Per-series title-rotation configuration and state (§3/§4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclingConfig {
    pub series_id: Uuid,
    pub items: Vec<String>,
    pub mode: CyclingMode,
    pub gap_leap: bool,
    pub current_index: u32,
}

impl CyclingConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.items.is_empty() {
            return Err(CoreError::Validation(
                "cycling items must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub series_id: Uuid,
    pub minutes_before: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderAck {
    pub reminder_id: Uuid,
    pub instance_date: CalendarDate,
}

/// A directed parent→child temporal dependency (§3/§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub parent_series_id: Uuid,
    pub child_series_id: Uuid,
    pub target_distance_minutes: i64,
    pub early_wobble_minutes: u32,
    pub late_wobble_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintTarget {
    Tag(Uuid),
    Series(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    MustBeOnSameDay,
    CantBeOnSameDay,
    MustBeNextTo,
    CantBeNextTo,
    MustBeBefore,
    MustBeAfter,
    MustBeWithin(u32),
}

/// A global ordering rule between two resolved target sets (§3/§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalConstraint {
    pub id: Uuid,
    pub source: ConstraintTarget,
    pub dest: ConstraintTarget,
    pub kind: ConstraintType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SchemaVersionRow {
    pub version: i64,
    pub applied_at: chrono::NaiveDateTime,
}

/// A fully assembled series: core row + patterns + tags + cycling +
/// adaptive config + reminders, the shape `storage::load_full_series`
/// returns and `storage::persist_new_series` consumes (§4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSeries {
    pub series: Series,
    pub patterns: Vec<PatternRecord>,
    pub tags: Vec<Tag>,
    pub cycling: Option<CyclingConfig>,
    pub adaptive_duration: Option<AdaptiveDurationConfig>,
    pub reminders: Vec<Reminder>,
}

/// Input DTO for `series::create` — mirrors the normalization spec.md §4.6
/// describes (singular `pattern` folds into `patterns`, bare `time` folds
/// into `time_of_day`, absent patterns/count/endDate defaults `count=1`).
#[derive(Debug, Clone, Default)]
pub struct NewSeriesInput {
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<CalendarDate>,
    pub end_date: Option<CalendarDate>,
    pub time_of_day: Option<TimeSpec>,
    pub time: Option<TimeOfDay>,
    pub duration: Option<DurationSpec>,
    pub count: Option<u32>,
    pub pattern: Option<crate::pattern::Pattern>,
    pub patterns: Vec<crate::pattern::Pattern>,
    pub fixed: bool,
    pub wiggle: Option<Wiggle>,
    pub tags: Vec<String>,
    pub cycling: Option<CyclingConfig>,
    pub adaptive_duration: Option<AdaptiveDurationConfig>,
    pub reminders: Vec<Reminder>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSeriesInput {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub end_date: Option<Option<CalendarDate>>,
    pub time_of_day: Option<TimeSpec>,
    pub duration: Option<DurationSpec>,
    pub count: Option<Option<u32>>,
    pub locked: Option<bool>,
    pub fixed: Option<bool>,
    pub wiggle: Option<Wiggle>,
}

impl UpdateSeriesInput {
    /// Whether this update touches nothing but `locked`, and sets it to
    /// `false`. A locked series rejects every other mutation but must still
    /// accept its own unlock (spec.md §3 `Series.locked`).
    pub fn is_unlock_only(&self) -> bool {
        self.locked == Some(false)
            && self.title.is_none()
            && self.description.is_none()
            && self.end_date.is_none()
            && self.time_of_day.is_none()
            && self.duration.is_none()
            && self.count.is_none()
            && self.fixed.is_none()
            && self.wiggle.is_none()
    }
}
