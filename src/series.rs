//! Series CRUD and normalization (spec.md §4.6), grounded on
//! `rusk_core::repository::series`'s create/update/delete/transaction shape.
//!
//! Composite writes (a series plus its patterns, tags, cycling config,
//! adaptive-duration config, and reminders) are executed as a sequence of
//! single-entity `Storage` calls rather than one backend transaction: the
//! `Storage` trait is deliberately not transaction-aware (see
//! `storage::mod`'s doc comment), and spec.md excludes multi-user
//! concurrency, so there is no concurrent writer to race against mid-sequence.

use tracing::instrument;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{FullSeries, NewSeriesInput, Series, TimeSpec, UpdateSeriesInput};
use crate::pattern::{Pattern, PatternRecord};
use crate::storage::Storage;
use crate::time::LocalDateTime;

/// Fold a `NewSeriesInput`'s ergonomic shortcuts (`time`, `pattern`, absent
/// `count`/`endDate`) into the canonical `Series` + pattern list shape.
fn normalize(input: &NewSeriesInput, now: LocalDateTime) -> Result<(Series, Vec<Pattern>), CoreError> {
    if input.title.trim().is_empty() {
        return Err(CoreError::Validation("series title must not be empty".into()));
    }
    let start_date = input
        .start_date
        .ok_or_else(|| CoreError::Validation("series startDate is required".into()))?;

    let time_of_day = match (input.time_of_day, input.time) {
        (Some(t), _) => t,
        (None, Some(t)) => TimeSpec::At(t),
        (None, None) => TimeSpec::AllDay,
    };

    let duration = input
        .duration
        .unwrap_or(crate::models::DurationSpec::AllDay);

    let mut patterns = input.patterns.clone();
    if let Some(p) = input.pattern.clone() {
        patterns.push(p);
    }

    let count = if patterns.is_empty() && input.count.is_none() && input.end_date.is_none() {
        Some(1)
    } else {
        input.count
    };

    let series = Series {
        id: Uuid::now_v7(),
        title: input.title.clone(),
        description: input.description.clone(),
        start_date,
        end_date: input.end_date,
        time_of_day,
        duration,
        count,
        created_at: now,
        updated_at: now,
        locked: false,
        fixed: input.fixed,
        wiggle: input.wiggle.unwrap_or_else(crate::models::Wiggle::none),
    };
    series.validate_invariants()?;
    Ok((series, patterns))
}

/// Create a series and every attached sub-resource (patterns, tags,
/// cycling, adaptive duration, reminders), returning the assembled shape.
#[instrument(skip(storage, input))]
pub async fn create(
    storage: &dyn Storage,
    input: NewSeriesInput,
    now: LocalDateTime,
) -> Result<FullSeries, CoreError> {
    let (series, patterns) = normalize(&input, now)?;
    storage.create_series(&series).await?;

    let mut pattern_records = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let record = PatternRecord {
            id: Uuid::new_v4(),
            series_id: series.id,
            pattern,
            condition_id: None,
        };
        storage.create_pattern(&record).await?;
        pattern_records.push(record);
    }

    let mut tags = Vec::with_capacity(input.tags.len());
    for name in &input.tags {
        let tag = crate::models::Tag {
            id: Uuid::new_v4(),
            name: name.clone(),
        };
        match storage.create_tag(&tag).await {
            Ok(()) => {}
            Err(CoreError::DuplicateKey(_)) => {}
            Err(e) => return Err(e),
        }
        storage.tag_series(series.id, tag.id).await?;
        tags.push(tag);
    }

    let cycling = if let Some(mut cycling) = input.cycling.clone() {
        cycling.series_id = series.id;
        cycling.validate()?;
        storage.upsert_cycling(&cycling).await?;
        Some(cycling)
    } else {
        None
    };

    let adaptive_duration = if let Some(mut adaptive) = input.adaptive_duration {
        adaptive.series_id = series.id;
        storage.upsert_adaptive_duration(&adaptive).await?;
        Some(adaptive)
    } else {
        None
    };

    let mut reminders = Vec::with_capacity(input.reminders.len());
    for reminder in input.reminders {
        let reminder = crate::models::Reminder {
            id: Uuid::new_v4(),
            series_id: series.id,
            ..reminder
        };
        storage.create_reminder(&reminder).await?;
        reminders.push(reminder);
    }

    Ok(FullSeries {
        series,
        patterns: pattern_records,
        tags,
        cycling,
        adaptive_duration,
        reminders,
    })
}

/// Load a series plus every attached sub-resource.
#[instrument(skip(storage))]
pub async fn get_full(storage: &dyn Storage, id: Uuid) -> Result<FullSeries, CoreError> {
    let series = storage.get_series(id).await?;
    let patterns = storage.get_patterns_for_series(id).await?;
    let tags = storage.get_tags_for_series(id).await?;
    let cycling = storage.get_cycling(id).await?;
    let adaptive_duration = storage.get_adaptive_duration(id).await?;
    let reminders = storage.get_reminders_for_series(id).await?;
    Ok(FullSeries {
        series,
        patterns,
        tags,
        cycling,
        adaptive_duration,
        reminders,
    })
}

/// Apply a partial update to a series' core fields. Rejects edits to a
/// locked series (spec.md §3 `Series.locked` invariant).
#[instrument(skip(storage, update))]
pub async fn update(
    storage: &dyn Storage,
    id: Uuid,
    update: UpdateSeriesInput,
    now: LocalDateTime,
) -> Result<Series, CoreError> {
    let mut series = storage.get_series(id).await?;
    if series.locked && !update.is_unlock_only() {
        return Err(CoreError::LockedSeries(id.to_string()));
    }
    if let Some(title) = update.title {
        series.title = title;
    }
    if let Some(description) = update.description {
        series.description = description;
    }
    if let Some(end_date) = update.end_date {
        series.end_date = end_date;
    }
    if let Some(time_of_day) = update.time_of_day {
        series.time_of_day = time_of_day;
    }
    if let Some(duration) = update.duration {
        series.duration = duration;
    }
    if let Some(count) = update.count {
        series.count = count;
    }
    if let Some(locked) = update.locked {
        series.locked = locked;
    }
    if let Some(fixed) = update.fixed {
        series.fixed = fixed;
    }
    if let Some(wiggle) = update.wiggle {
        series.wiggle = wiggle;
    }
    series.updated_at = now;
    series.validate_invariants()?;
    storage.update_series(&series).await?;
    Ok(series)
}

/// Lock a series, blocking every mutation but unlock itself.
pub async fn lock(storage: &dyn Storage, id: Uuid, now: LocalDateTime) -> Result<Series, CoreError> {
    update(
        storage,
        id,
        UpdateSeriesInput {
            locked: Some(true),
            ..Default::default()
        },
        now,
    )
    .await
}

/// Unlock a series. The one mutation a locked series still accepts.
pub async fn unlock(storage: &dyn Storage, id: Uuid, now: LocalDateTime) -> Result<Series, CoreError> {
    update(
        storage,
        id,
        UpdateSeriesInput {
            locked: Some(false),
            ..Default::default()
        },
        now,
    )
    .await
}

/// Delete a series. `Storage::delete_series` enforces the full cascade/
/// restrict matrix atomically (spec.md §4.3): it fails with
/// `CompletionsExist`/`LinkedChildrenExist` and leaves the store exactly
/// unchanged rather than orphaning history or a dependent child series, so
/// this does not pre-delete any sub-resource itself.
#[instrument(skip(storage))]
pub async fn delete(storage: &dyn Storage, id: Uuid) -> Result<(), CoreError> {
    storage.delete_series(id).await
}

/// Split a series at `split_date`: the original series is truncated to end
/// the day before `split_date` (or capped at its existing `count`, whichever
/// is reached first), and a new series is created starting at `split_date`
/// carrying the same pattern/time/duration/wiggle configuration. Used when a
/// recurring activity's schedule changes going forward without rewriting
/// history.
#[instrument(skip(storage))]
pub async fn split_series(
    storage: &dyn Storage,
    id: Uuid,
    split_date: crate::time::CalendarDate,
    now: LocalDateTime,
) -> Result<FullSeries, CoreError> {
    let original = get_full(storage, id).await?;
    if original.series.locked {
        return Err(CoreError::LockedSeries(id.to_string()));
    }
    if split_date <= original.series.start_date {
        return Err(CoreError::Validation(
            "split date must be after the series start date".into(),
        ));
    }
    if let Some(end) = original.series.end_date {
        if split_date >= end {
            return Err(CoreError::Validation(
                "split date must be before the series end date".into(),
            ));
        }
    }

    let mut truncated = original.series.clone();
    truncated.end_date = Some(split_date);
    truncated.count = None;
    truncated.updated_at = now;
    truncated.validate_invariants()?;
    storage.update_series(&truncated).await?;

    let new_input = NewSeriesInput {
        title: original.series.title.clone(),
        description: original.series.description.clone(),
        start_date: Some(split_date),
        end_date: None,
        time_of_day: Some(original.series.time_of_day),
        time: None,
        duration: Some(original.series.duration),
        count: None,
        pattern: None,
        patterns: original.patterns.iter().map(|p| p.pattern.clone()).collect(),
        fixed: original.series.fixed,
        wiggle: Some(original.series.wiggle),
        tags: original.tags.iter().map(|t| t.name.clone()).collect(),
        cycling: original.cycling.clone(),
        adaptive_duration: original.adaptive_duration,
        reminders: original
            .reminders
            .iter()
            .map(|r| crate::models::Reminder {
                id: Uuid::nil(),
                series_id: Uuid::nil(),
                minutes_before: r.minutes_before,
                label: r.label.clone(),
            })
            .collect(),
    };
    create(storage, new_input, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DurationSpec;
    use crate::storage::memory::MemoryStorage;
    use crate::time::CalendarDate;

    fn now() -> LocalDateTime {
        LocalDateTime::parse("2024-01-01T00:00:00").unwrap()
    }

    fn base_input() -> NewSeriesInput {
        NewSeriesInput {
            title: "Water plants".into(),
            start_date: Some(CalendarDate::parse("2024-01-01").unwrap()),
            duration: Some(DurationSpec::Minutes(10)),
            patterns: vec![Pattern::EveryNDays(3)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_defaults_count_to_one_when_unbounded() {
        let storage = MemoryStorage::new();
        let full = create(&storage, base_input(), now()).await.unwrap();
        assert_eq!(full.series.count, Some(1));
    }

    #[tokio::test]
    async fn update_rejects_locked_series() {
        let storage = MemoryStorage::new();
        let mut input = base_input();
        input.count = Some(5);
        let full = create(&storage, input, now()).await.unwrap();
        let update_req = UpdateSeriesInput {
            locked: Some(true),
            ..Default::default()
        };
        update(&storage, full.series.id, update_req, now()).await.unwrap();
        let second = UpdateSeriesInput {
            title: Some("renamed".into()),
            ..Default::default()
        };
        let err = update(&storage, full.series.id, second, now()).await;
        assert!(matches!(err, Err(CoreError::LockedSeries(_))));
    }

    #[tokio::test]
    async fn unlock_is_the_one_mutation_a_locked_series_accepts() {
        let storage = MemoryStorage::new();
        let mut input = base_input();
        input.count = Some(5);
        let full = create(&storage, input, now()).await.unwrap();
        lock(&storage, full.series.id, now()).await.unwrap();
        let series = unlock(&storage, full.series.id, now()).await.unwrap();
        assert!(!series.locked);
        // now unlocked, ordinary edits succeed again
        let renamed = update(
            &storage,
            full.series.id,
            UpdateSeriesInput {
                title: Some("renamed".into()),
                ..Default::default()
            },
            now(),
        )
        .await
        .unwrap();
        assert_eq!(renamed.title, "renamed");
    }

    #[tokio::test]
    async fn split_series_truncates_original_and_creates_continuation() {
        let storage = MemoryStorage::new();
        let mut input = base_input();
        input.count = Some(10);
        let full = create(&storage, input, now()).await.unwrap();
        let split_at = CalendarDate::parse("2024-02-01").unwrap();
        let continuation = split_series(&storage, full.series.id, split_at, now()).await.unwrap();
        let original = storage.get_series(full.series.id).await.unwrap();
        assert_eq!(original.end_date, Some(split_at));
        assert_eq!(continuation.series.start_date, split_at);
    }

    #[tokio::test]
    async fn split_series_rejects_locked_source() {
        // spec.md §8 scenario 6: locked source rejects split.
        let storage = MemoryStorage::new();
        let mut input = base_input();
        input.count = Some(10);
        let full = create(&storage, input, now()).await.unwrap();
        lock(&storage, full.series.id, now()).await.unwrap();
        let split_at = CalendarDate::parse("2024-02-01").unwrap();
        let err = split_series(&storage, full.series.id, split_at, now()).await;
        assert!(matches!(err, Err(CoreError::LockedSeries(_))));
    }
}
