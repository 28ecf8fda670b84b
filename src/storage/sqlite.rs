//! `sqlx`-backed `Storage` implementation. Foreign keys are enforced at the
//! engine level (spec.md §4.4); cascade/restrict behavior mostly falls out
//! of the schema's `ON DELETE CASCADE`/`ON DELETE RESTRICT` clauses, with a
//! handful of checks (`CompletionsExist`, `LinkedChildrenExist`) done ahead
//! of the delete so the domain-specific error variant can be raised instead
//! of a raw foreign-key failure — the same translation
//! `rusk_core::repository::series::delete_series` performs.

use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::condition::{Condition, ConditionRow};
use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    AdaptiveDurationConfig, Completion, ConstraintTarget, ConstraintType, CyclingConfig,
    CyclingMode, DurationSpec, ExceptionType, InstanceException, Link, Reminder, ReminderAck,
    RelationalConstraint, Series, Tag, TimeSpec, Wiggle,
};
use crate::pattern::{Pattern, PatternRecord, WeekdayMask};
use crate::time::{CalendarDate, LocalDateTime, TimeOfDay, Weekday};

use super::{
    AdaptiveDurationStore, CompletionStore, ConditionStore, ConstraintStore, CyclingStore,
    DurationWindow, ExceptionStore, LinkStore, PatternStore, ReminderStore, SeriesStore, TagStore,
};

pub struct SqliteStorage {
    pool: DbPool,
}

impl SqliteStorage {
    pub fn new(pool: DbPool) -> Self {
        SqliteStorage { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run `f` inside a real sqlite transaction; rolls back automatically if
    /// `f` returns `Err` or the transaction is dropped without `commit()`.
    pub async fn run_transaction<'a, F, T>(&'a self, f: F) -> Result<T, CoreError>
    where
        F: for<'c> FnOnce(
            &'c mut sqlx::Transaction<'_, sqlx::Sqlite>,
        ) -> futures_core_reexport::BoxFuture<'c, Result<T, CoreError>>,
    {
        let mut tx = self.pool.begin().await?;
        let result = f(&mut tx).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(e)
            }
        }
    }
}

/// A tiny local shim so `run_transaction`'s signature doesn't need a direct
/// dependency on the `futures` crate just for `BoxFuture`.
mod futures_core_reexport {
    pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
}

fn map_sqlx_error(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        let message = db_err.message();
        if message.contains("UNIQUE constraint failed") {
            return CoreError::DuplicateKey(message.to_string());
        }
        if message.contains("FOREIGN KEY constraint failed") {
            return CoreError::ForeignKey(message.to_string());
        }
    }
    CoreError::Database(e)
}

fn duration_columns(d: DurationSpec) -> (&'static str, Option<i64>) {
    match d {
        DurationSpec::AllDay => ("all_day", None),
        DurationSpec::Minutes(m) => ("minutes", Some(m as i64)),
        DurationSpec::Adaptive => ("adaptive", None),
    }
}

fn duration_from_columns(kind: &str, minutes: Option<i64>) -> Result<DurationSpec, CoreError> {
    match kind {
        "all_day" => Ok(DurationSpec::AllDay),
        "minutes" => Ok(DurationSpec::Minutes(minutes.ok_or_else(|| {
            CoreError::InvalidData("duration_minutes missing for kind=minutes".into())
        })? as u32)),
        "adaptive" => Ok(DurationSpec::Adaptive),
        other => Err(CoreError::InvalidData(format!("unknown duration_kind '{other}'"))),
    }
}

fn row_to_series(row: &sqlx::sqlite::SqliteRow) -> Result<Series, CoreError> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let all_day: i64 = row.try_get("all_day").map_err(map_sqlx_error)?;
    let time_of_day: Option<String> = row.try_get("time_of_day").map_err(map_sqlx_error)?;
    let duration_kind: String = row.try_get("duration_kind").map_err(map_sqlx_error)?;
    let duration_minutes: Option<i64> = row.try_get("duration_minutes").map_err(map_sqlx_error)?;
    let start_date: String = row.try_get("start_date").map_err(map_sqlx_error)?;
    let end_date: Option<String> = row.try_get("end_date").map_err(map_sqlx_error)?;
    let created_at: String = row.try_get("created_at").map_err(map_sqlx_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(map_sqlx_error)?;
    let wiggle_earliest: Option<String> = row.try_get("wiggle_earliest").map_err(map_sqlx_error)?;
    let wiggle_latest: Option<String> = row.try_get("wiggle_latest").map_err(map_sqlx_error)?;

    let time_spec = if all_day != 0 {
        TimeSpec::AllDay
    } else {
        let t = time_of_day.ok_or_else(|| {
            CoreError::InvalidData("time_of_day missing for non-all-day series".into())
        })?;
        TimeSpec::At(TimeOfDay::parse(&t)?)
    };

    Ok(Series {
        id: Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
        title: row.try_get("title").map_err(map_sqlx_error)?,
        description: row.try_get("description").map_err(map_sqlx_error)?,
        start_date: CalendarDate::parse(&start_date)?,
        end_date: end_date.map(|d| CalendarDate::parse(&d)).transpose()?,
        time_of_day: time_spec,
        duration: duration_from_columns(&duration_kind, duration_minutes)?,
        count: row
            .try_get::<Option<i64>, _>("count")
            .map_err(map_sqlx_error)?
            .map(|c| c as u32),
        created_at: LocalDateTime::parse(&created_at)?,
        updated_at: LocalDateTime::parse(&updated_at)?,
        locked: row.try_get::<i64, _>("locked").map_err(map_sqlx_error)? != 0,
        fixed: row.try_get::<i64, _>("fixed").map_err(map_sqlx_error)? != 0,
        wiggle: Wiggle {
            days_before: row.try_get::<i64, _>("wiggle_days_before").map_err(map_sqlx_error)? as u32,
            days_after: row.try_get::<i64, _>("wiggle_days_after").map_err(map_sqlx_error)? as u32,
            earliest: wiggle_earliest.map(|t| TimeOfDay::parse(&t)).transpose()?,
            latest: wiggle_latest.map(|t| TimeOfDay::parse(&t)).transpose()?,
        },
    })
}

#[async_trait]
impl SeriesStore for SqliteStorage {
    async fn create_series(&self, series: &Series) -> Result<(), CoreError> {
        let (all_day, time_of_day) = match series.time_of_day {
            TimeSpec::AllDay => (1i64, None),
            TimeSpec::At(t) => (0i64, Some(t.format())),
        };
        let (duration_kind, duration_minutes) = duration_columns(series.duration);
        sqlx::query(
            "INSERT INTO series (id, title, description, start_date, end_date, all_day,
             time_of_day, duration_kind, duration_minutes, count, created_at, updated_at,
             locked, fixed, wiggle_days_before, wiggle_days_after, wiggle_earliest, wiggle_latest)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(series.id.to_string())
        .bind(&series.title)
        .bind(&series.description)
        .bind(series.start_date.format())
        .bind(series.end_date.map(|d| d.format()))
        .bind(all_day)
        .bind(time_of_day)
        .bind(duration_kind)
        .bind(duration_minutes)
        .bind(series.count.map(|c| c as i64))
        .bind(series.created_at.format())
        .bind(series.updated_at.format())
        .bind(series.locked as i64)
        .bind(series.fixed as i64)
        .bind(series.wiggle.days_before as i64)
        .bind(series.wiggle.days_after as i64)
        .bind(series.wiggle.earliest.map(|t| t.format()))
        .bind(series.wiggle.latest.map(|t| t.format()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_series(&self, id: Uuid) -> Result<Series, CoreError> {
        let row = sqlx::query("SELECT * FROM series WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        row_to_series(&row)
    }

    async fn update_series(&self, series: &Series) -> Result<(), CoreError> {
        let (all_day, time_of_day) = match series.time_of_day {
            TimeSpec::AllDay => (1i64, None),
            TimeSpec::At(t) => (0i64, Some(t.format())),
        };
        let (duration_kind, duration_minutes) = duration_columns(series.duration);
        let result = sqlx::query(
            "UPDATE series SET title=?, description=?, start_date=?, end_date=?, all_day=?,
             time_of_day=?, duration_kind=?, duration_minutes=?, count=?, updated_at=?,
             locked=?, fixed=?, wiggle_days_before=?, wiggle_days_after=?, wiggle_earliest=?,
             wiggle_latest=? WHERE id=?",
        )
        .bind(&series.title)
        .bind(&series.description)
        .bind(series.start_date.format())
        .bind(series.end_date.map(|d| d.format()))
        .bind(all_day)
        .bind(time_of_day)
        .bind(duration_kind)
        .bind(duration_minutes)
        .bind(series.count.map(|c| c as i64))
        .bind(series.updated_at.format())
        .bind(series.locked as i64)
        .bind(series.fixed as i64)
        .bind(series.wiggle.days_before as i64)
        .bind(series.wiggle.days_after as i64)
        .bind(series.wiggle.earliest.map(|t| t.format()))
        .bind(series.wiggle.latest.map(|t| t.format()))
        .bind(series.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(series.id.to_string()));
        }
        Ok(())
    }

    async fn delete_series(&self, id: Uuid) -> Result<(), CoreError> {
        let has_completion: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM completion WHERE series_id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if has_completion > 0 {
            return Err(CoreError::CompletionsExist(id.to_string()));
        }
        let has_parent_link: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM link WHERE parent_series_id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        if has_parent_link > 0 {
            return Err(CoreError::LinkedChildrenExist(id.to_string()));
        }
        let result = sqlx::query("DELETE FROM series WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_series(&self) -> Result<Vec<Series>, CoreError> {
        let rows = sqlx::query("SELECT * FROM series")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_series).collect()
    }
}

fn pattern_to_columns(pattern: &Pattern) -> (String, Option<i64>, Option<i64>, Option<i64>, Option<i64>, Vec<Weekday>) {
    match pattern {
        Pattern::Daily => ("daily".into(), None, None, None, None, vec![]),
        Pattern::EveryNDays(n) => ("every_n_days".into(), Some(*n as i64), None, None, None, vec![]),
        Pattern::Weekly(mask) => ("weekly".into(), None, None, None, None, mask_to_vec(*mask)),
        Pattern::EveryNWeeks { n, mask } => (
            "every_n_weeks".into(),
            Some(*n as i64),
            None,
            None,
            None,
            mask_to_vec(*mask),
        ),
        Pattern::Monthly(d) => ("monthly".into(), None, Some(*d as i64), None, None, vec![]),
        Pattern::LastDayOfMonth => ("last_day_of_month".into(), None, None, None, None, vec![]),
        Pattern::Yearly { month, day } => (
            "yearly".into(),
            None,
            Some(*day as i64),
            Some(*month as i64),
            None,
            vec![],
        ),
        Pattern::Weekdays(mask) => ("weekdays".into(), None, None, None, None, mask_to_vec(*mask)),
        Pattern::WeekdaysOnly => ("weekdays_only".into(), None, None, None, None, vec![]),
        Pattern::WeekendsOnly => ("weekends_only".into(), None, None, None, None, vec![]),
        Pattern::NthWeekdayOfMonth { n, weekday } => (
            "nth_weekday_of_month".into(),
            Some(*n as i64),
            None,
            None,
            Some(weekday.number() as i64),
            vec![],
        ),
        Pattern::LastWeekdayOfMonth(weekday) => (
            "last_weekday_of_month".into(),
            None,
            None,
            None,
            Some(weekday.number() as i64),
            vec![],
        ),
        Pattern::NthToLastWeekdayOfMonth { n, weekday } => (
            "nth_to_last_weekday_of_month".into(),
            Some(*n as i64),
            None,
            None,
            Some(weekday.number() as i64),
            vec![],
        ),
        Pattern::Union(_) => ("union".into(), None, None, None, None, vec![]),
        Pattern::Except { .. } => ("except".into(), None, None, None, None, vec![]),
    }
}

fn mask_to_vec(mask: WeekdayMask) -> Vec<Weekday> {
    [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ]
    .into_iter()
    .filter(|d| mask.contains(*d))
    .collect()
}

#[async_trait]
impl PatternStore for SqliteStorage {
    async fn create_pattern(&self, pattern: &PatternRecord) -> Result<(), CoreError> {
        // Union/Except variants recurse into child pattern rows sharing a
        // union_group_id / except_role marker; simple variants are one row.
        self.create_pattern_tree(pattern.id, pattern.series_id, &pattern.pattern, pattern.condition_id, None, None)
            .await
    }

    async fn get_patterns_for_series(&self, series_id: Uuid) -> Result<Vec<PatternRecord>, CoreError> {
        let rows = sqlx::query(
            "SELECT id, kind, n, day, month, weekday, condition_id FROM pattern
             WHERE series_id = ? AND union_group_id IS NULL AND except_role IS NULL",
        )
        .bind(series_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(map_sqlx_error)?;
            let id = Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))?;
            let pattern = self.load_pattern_tree(id).await?;
            let condition_id: Option<String> = row.try_get("condition_id").map_err(map_sqlx_error)?;
            out.push(PatternRecord {
                id,
                series_id,
                pattern,
                condition_id: condition_id
                    .map(|c| Uuid::parse_str(&c))
                    .transpose()
                    .map_err(|e| CoreError::InvalidData(e.to_string()))?,
            });
        }
        Ok(out)
    }

    async fn delete_patterns_for_series(&self, series_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM pattern WHERE series_id = ?")
            .bind(series_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

impl SqliteStorage {
    fn create_pattern_tree<'a>(
        &'a self,
        id: Uuid,
        series_id: Uuid,
        pattern: &'a Pattern,
        condition_id: Option<Uuid>,
        union_group_id: Option<Uuid>,
        except_role: Option<&'a str>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let (kind, n, day, month, weekday, mask_days) = pattern_to_columns(pattern);
            sqlx::query(
                "INSERT INTO pattern (id, series_id, kind, n, day, month, weekday, condition_id,
                 union_group_id, except_role) VALUES (?,?,?,?,?,?,?,?,?,?)",
            )
            .bind(id.to_string())
            .bind(series_id.to_string())
            .bind(&kind)
            .bind(n)
            .bind(day)
            .bind(month)
            .bind(weekday)
            .bind(condition_id.map(|c| c.to_string()))
            .bind(union_group_id.map(|u| u.to_string()))
            .bind(except_role)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            for day_val in mask_days {
                sqlx::query("INSERT INTO pattern_weekday (pattern_id, weekday) VALUES (?,?)")
                    .bind(id.to_string())
                    .bind(day_val.number() as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            }

            match pattern {
                Pattern::Union(children) => {
                    for child in children {
                        let child_id = Uuid::new_v4();
                        self.create_pattern_tree(child_id, series_id, child, None, Some(id), None)
                            .await?;
                    }
                }
                Pattern::Except { base, exclusion } => {
                    let base_id = Uuid::new_v4();
                    self.create_pattern_tree(base_id, series_id, base, None, Some(id), Some("base"))
                        .await?;
                    let excl_id = Uuid::new_v4();
                    self.create_pattern_tree(excl_id, series_id, exclusion, None, Some(id), Some("exclusion"))
                        .await?;
                }
                _ => {}
            }
            Ok(())
        })
    }

    fn load_pattern_tree<'a>(
        &'a self,
        id: Uuid,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Pattern, CoreError>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT kind, n, day, month, weekday FROM pattern WHERE id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            let kind: String = row.try_get("kind").map_err(map_sqlx_error)?;
            let n: Option<i64> = row.try_get("n").map_err(map_sqlx_error)?;
            let day: Option<i64> = row.try_get("day").map_err(map_sqlx_error)?;
            let month: Option<i64> = row.try_get("month").map_err(map_sqlx_error)?;
            let weekday: Option<i64> = row.try_get("weekday").map_err(map_sqlx_error)?;

            let mask = if matches!(kind.as_str(), "weekly" | "every_n_weeks" | "weekdays") {
                let weekday_rows = sqlx::query("SELECT weekday FROM pattern_weekday WHERE pattern_id = ?")
                    .bind(id.to_string())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
                let mut days = Vec::new();
                for wr in weekday_rows {
                    let num: i64 = wr.try_get("weekday").map_err(map_sqlx_error)?;
                    days.push(number_to_weekday(num as u8)?);
                }
                WeekdayMask::from_days(&days)
            } else {
                WeekdayMask::empty()
            };

            match kind.as_str() {
                "daily" => Ok(Pattern::Daily),
                "every_n_days" => Ok(Pattern::EveryNDays(n.ok_or_else(|| missing("n"))? as u32)),
                "weekly" => Ok(Pattern::Weekly(mask)),
                "every_n_weeks" => Ok(Pattern::EveryNWeeks { n: n.ok_or_else(|| missing("n"))? as u32, mask }),
                "monthly" => Ok(Pattern::Monthly(day.ok_or_else(|| missing("day"))? as u32)),
                "last_day_of_month" => Ok(Pattern::LastDayOfMonth),
                "yearly" => Ok(Pattern::Yearly {
                    month: month.ok_or_else(|| missing("month"))? as u32,
                    day: day.ok_or_else(|| missing("day"))? as u32,
                }),
                "weekdays" => Ok(Pattern::Weekdays(mask)),
                "weekdays_only" => Ok(Pattern::WeekdaysOnly),
                "weekends_only" => Ok(Pattern::WeekendsOnly),
                "nth_weekday_of_month" => Ok(Pattern::NthWeekdayOfMonth {
                    n: n.ok_or_else(|| missing("n"))? as u32,
                    weekday: number_to_weekday(weekday.ok_or_else(|| missing("weekday"))? as u8)?,
                }),
                "last_weekday_of_month" => Ok(Pattern::LastWeekdayOfMonth(number_to_weekday(
                    weekday.ok_or_else(|| missing("weekday"))? as u8,
                )?)),
                "nth_to_last_weekday_of_month" => Ok(Pattern::NthToLastWeekdayOfMonth {
                    n: n.ok_or_else(|| missing("n"))? as u32,
                    weekday: number_to_weekday(weekday.ok_or_else(|| missing("weekday"))? as u8)?,
                }),
                "union" => {
                    let child_rows = sqlx::query("SELECT id FROM pattern WHERE union_group_id = ?")
                        .bind(id.to_string())
                        .fetch_all(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;
                    let mut children = Vec::new();
                    for cr in child_rows {
                        let cid: String = cr.try_get("id").map_err(map_sqlx_error)?;
                        let cid = Uuid::parse_str(&cid).map_err(|e| CoreError::InvalidData(e.to_string()))?;
                        children.push(self.load_pattern_tree(cid).await?);
                    }
                    Ok(Pattern::Union(children))
                }
                "except" => {
                    let base_row = sqlx::query(
                        "SELECT id FROM pattern WHERE union_group_id = ? AND except_role = 'base'",
                    )
                    .bind(id.to_string())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
                    let excl_row = sqlx::query(
                        "SELECT id FROM pattern WHERE union_group_id = ? AND except_role = 'exclusion'",
                    )
                    .bind(id.to_string())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
                    let base_id: String = base_row.try_get("id").map_err(map_sqlx_error)?;
                    let excl_id: String = excl_row.try_get("id").map_err(map_sqlx_error)?;
                    let base_id = Uuid::parse_str(&base_id).map_err(|e| CoreError::InvalidData(e.to_string()))?;
                    let excl_id = Uuid::parse_str(&excl_id).map_err(|e| CoreError::InvalidData(e.to_string()))?;
                    Ok(Pattern::Except {
                        base: Box::new(self.load_pattern_tree(base_id).await?),
                        exclusion: Box::new(self.load_pattern_tree(excl_id).await?),
                    })
                }
                other => Err(CoreError::InvalidData(format!("unknown pattern kind '{other}'"))),
            }
        })
    }
}

fn missing(field: &str) -> CoreError {
    CoreError::InvalidData(format!("pattern row missing '{field}'"))
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
        other => Err(CoreError::InvalidData(format!("invalid weekday number {other}"))),
    }
}

#[async_trait]
impl ConditionStore for SqliteStorage {
    async fn create_condition(&self, series_id: Uuid, condition: &Condition) -> Result<Uuid, CoreError> {
        let rows = crate::condition::flatten(series_id, condition);
        let root_id = rows
            .iter()
            .find(|r| r.parent_id.is_none())
            .map(|r| r.id)
            .ok_or_else(|| CoreError::InvalidCondition("flattened tree has no root".into()))?;
        for row in &rows {
            sqlx::query(
                "INSERT INTO condition (id, series_id, parent_id, kind, series_ref, window_days,
                 comparison, value, days_json) VALUES (?,?,?,?,?,?,?,?,?)",
            )
            .bind(row.id.to_string())
            .bind(row.series_id.to_string())
            .bind(row.parent_id.map(|p| p.to_string()))
            .bind(&row.kind)
            .bind(row.series_ref.map(|s| s.to_string()))
            .bind(row.window_days)
            .bind(&row.comparison)
            .bind(row.value)
            .bind(&row.days_json)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(root_id)
    }

    async fn get_condition_rows(&self, series_id: Uuid) -> Result<Vec<ConditionRow>, CoreError> {
        let rows = sqlx::query("SELECT * FROM condition WHERE series_id = ?")
            .bind(series_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(map_sqlx_error)?;
                let series_id: String = row.try_get("series_id").map_err(map_sqlx_error)?;
                let parent_id: Option<String> = row.try_get("parent_id").map_err(map_sqlx_error)?;
                let series_ref: Option<String> = row.try_get("series_ref").map_err(map_sqlx_error)?;
                Ok(ConditionRow {
                    id: Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
                    series_id: Uuid::parse_str(&series_id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
                    parent_id: parent_id
                        .map(|p| Uuid::parse_str(&p))
                        .transpose()
                        .map_err(|e| CoreError::InvalidData(e.to_string()))?,
                    kind: row.try_get("kind").map_err(map_sqlx_error)?,
                    series_ref: series_ref
                        .map(|s| Uuid::parse_str(&s))
                        .transpose()
                        .map_err(|e| CoreError::InvalidData(e.to_string()))?,
                    window_days: row.try_get("window_days").map_err(map_sqlx_error)?,
                    comparison: row.try_get("comparison").map_err(map_sqlx_error)?,
                    value: row.try_get("value").map_err(map_sqlx_error)?,
                    days_json: row.try_get("days_json").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn delete_condition(&self, series_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM condition WHERE series_id = ?")
            .bind(series_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl CompletionStore for SqliteStorage {
    async fn log_completion(&self, completion: &Completion) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO completion (id, series_id, instance_date, actual_date, start_time, end_time)
             VALUES (?,?,?,?,?,?)",
        )
        .bind(completion.id.to_string())
        .bind(completion.series_id.to_string())
        .bind(completion.instance_date.format())
        .bind(completion.actual_date.format())
        .bind(completion.start.map(|t| t.format()))
        .bind(completion.end.map(|t| t.format()))
        .execute(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error(e) {
            CoreError::DuplicateKey(_) => CoreError::DuplicateCompletion {
                series_id: completion.series_id.to_string(),
                instance_date: completion.instance_date.format(),
            },
            other => other,
        })?;
        Ok(())
    }

    async fn get_completions_for_series(&self, series_id: Uuid) -> Result<Vec<Completion>, CoreError> {
        let rows = sqlx::query("SELECT * FROM completion WHERE series_id = ?")
            .bind(series_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_completion).collect()
    }

    async fn count_completions_in_window(
        &self,
        series_id: Uuid,
        as_of: CalendarDate,
        window_days: u32,
    ) -> Result<i64, CoreError> {
        let floor = as_of.sub_days(window_days as i64);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM completion WHERE series_id = ? AND instance_date > ? AND instance_date <= ?",
        )
        .bind(series_id.to_string())
        .bind(floor.format())
        .bind(as_of.format())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count)
    }

    async fn days_since_last_completion(
        &self,
        series_id: Uuid,
        as_of: CalendarDate,
    ) -> Result<Option<i64>, CoreError> {
        let last: Option<String> = sqlx::query_scalar(
            "SELECT MAX(instance_date) FROM completion WHERE series_id = ? AND instance_date <= ?",
        )
        .bind(series_id.to_string())
        .bind(as_of.format())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        last.map(|d| CalendarDate::parse(&d).map(|d| d.days_between(&as_of)))
            .transpose()
    }

    async fn get_recent_durations(
        &self,
        series_id: Uuid,
        window: DurationWindow,
    ) -> Result<Vec<u32>, CoreError> {
        let rows = match window {
            DurationWindow::LastN(n) => sqlx::query(
                "SELECT start_time, end_time FROM completion WHERE series_id = ? AND start_time IS NOT NULL
                 AND end_time IS NOT NULL ORDER BY instance_date DESC LIMIT ?",
            )
            .bind(series_id.to_string())
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?,
            DurationWindow::WindowDays { window_days, as_of } => {
                let floor = as_of.sub_days(window_days as i64);
                sqlx::query(
                    "SELECT start_time, end_time FROM completion WHERE series_id = ? AND start_time IS NOT NULL
                     AND end_time IS NOT NULL AND instance_date > ? AND instance_date <= ?",
                )
                .bind(series_id.to_string())
                .bind(floor.format())
                .bind(as_of.format())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?
            }
        };
        rows.iter()
            .map(|row| {
                let start: String = row.try_get("start_time").map_err(map_sqlx_error)?;
                let end: String = row.try_get("end_time").map_err(map_sqlx_error)?;
                let start = LocalDateTime::parse(&start)?;
                let end = LocalDateTime::parse(&end)?;
                Ok(start.minutes_between(&end).max(0) as u32)
            })
            .collect()
    }
}

fn row_to_completion(row: &sqlx::sqlite::SqliteRow) -> Result<Completion, CoreError> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let series_id: String = row.try_get("series_id").map_err(map_sqlx_error)?;
    let instance_date: String = row.try_get("instance_date").map_err(map_sqlx_error)?;
    let actual_date: String = row.try_get("actual_date").map_err(map_sqlx_error)?;
    let start: Option<String> = row.try_get("start_time").map_err(map_sqlx_error)?;
    let end: Option<String> = row.try_get("end_time").map_err(map_sqlx_error)?;
    Ok(Completion {
        id: Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
        series_id: Uuid::parse_str(&series_id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
        instance_date: CalendarDate::parse(&instance_date)?,
        actual_date: CalendarDate::parse(&actual_date)?,
        start: start.map(|s| LocalDateTime::parse(&s)).transpose()?,
        end: end.map(|s| LocalDateTime::parse(&s)).transpose()?,
    })
}

#[async_trait]
impl ExceptionStore for SqliteStorage {
    async fn upsert_exception(&self, exception: &InstanceException) -> Result<(), CoreError> {
        let kind = match exception.kind {
            ExceptionType::Cancelled => "cancelled",
            ExceptionType::Rescheduled => "rescheduled",
        };
        sqlx::query(
            "INSERT INTO instance_exception (series_id, original_date, kind, new_date, new_time)
             VALUES (?,?,?,?,?)
             ON CONFLICT(series_id, original_date) DO UPDATE SET
                kind=excluded.kind, new_date=excluded.new_date, new_time=excluded.new_time",
        )
        .bind(exception.series_id.to_string())
        .bind(exception.original_date.format())
        .bind(kind)
        .bind(exception.new_date.map(|d| d.format()))
        .bind(exception.new_time.map(|t| t.format()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_exceptions_for_series(&self, series_id: Uuid) -> Result<Vec<InstanceException>, CoreError> {
        let rows = sqlx::query("SELECT * FROM instance_exception WHERE series_id = ?")
            .bind(series_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind").map_err(map_sqlx_error)?;
                let original_date: String = row.try_get("original_date").map_err(map_sqlx_error)?;
                let new_date: Option<String> = row.try_get("new_date").map_err(map_sqlx_error)?;
                let new_time: Option<String> = row.try_get("new_time").map_err(map_sqlx_error)?;
                Ok(InstanceException {
                    series_id,
                    original_date: CalendarDate::parse(&original_date)?,
                    kind: match kind.as_str() {
                        "cancelled" => ExceptionType::Cancelled,
                        "rescheduled" => ExceptionType::Rescheduled,
                        other => {
                            return Err(CoreError::InvalidData(format!("unknown exception kind '{other}'")))
                        }
                    },
                    new_date: new_date.map(|d| CalendarDate::parse(&d)).transpose()?,
                    new_time: new_time.map(|t| TimeOfDay::parse(&t)).transpose()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReminderStore for SqliteStorage {
    async fn create_reminder(&self, reminder: &Reminder) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO reminder (id, series_id, minutes_before, label) VALUES (?,?,?,?)")
            .bind(reminder.id.to_string())
            .bind(reminder.series_id.to_string())
            .bind(reminder.minutes_before as i64)
            .bind(&reminder.label)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_reminders_for_series(&self, series_id: Uuid) -> Result<Vec<Reminder>, CoreError> {
        let rows = sqlx::query("SELECT * FROM reminder WHERE series_id = ?")
            .bind(series_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(map_sqlx_error)?;
                Ok(Reminder {
                    id: Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
                    series_id,
                    minutes_before: row.try_get::<i64, _>("minutes_before").map_err(map_sqlx_error)? as u32,
                    label: row.try_get("label").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn ack_reminder(&self, ack: &ReminderAck) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO reminder_ack (reminder_id, instance_date) VALUES (?,?)
             ON CONFLICT(reminder_id, instance_date) DO NOTHING",
        )
        .bind(ack.reminder_id.to_string())
        .bind(ack.instance_date.format())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_acks_for_reminder(&self, reminder_id: Uuid) -> Result<Vec<ReminderAck>, CoreError> {
        let rows = sqlx::query("SELECT instance_date FROM reminder_ack WHERE reminder_id = ?")
            .bind(reminder_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                let date: String = row.try_get("instance_date").map_err(map_sqlx_error)?;
                Ok(ReminderAck {
                    reminder_id,
                    instance_date: CalendarDate::parse(&date)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CyclingStore for SqliteStorage {
    async fn upsert_cycling(&self, config: &CyclingConfig) -> Result<(), CoreError> {
        let mode = match config.mode {
            CyclingMode::Sequential => "sequential",
            CyclingMode::Random => "random",
        };
        sqlx::query(
            "INSERT INTO cycling_config (series_id, mode, gap_leap, current_index) VALUES (?,?,?,?)
             ON CONFLICT(series_id) DO UPDATE SET mode=excluded.mode, gap_leap=excluded.gap_leap,
             current_index=excluded.current_index",
        )
        .bind(config.series_id.to_string())
        .bind(mode)
        .bind(config.gap_leap as i64)
        .bind(config.current_index as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM cycling_item WHERE series_id = ?")
            .bind(config.series_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for (position, title) in config.items.iter().enumerate() {
            sqlx::query("INSERT INTO cycling_item (series_id, position, title) VALUES (?,?,?)")
                .bind(config.series_id.to_string())
                .bind(position as i64)
                .bind(title)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn get_cycling(&self, series_id: Uuid) -> Result<Option<CyclingConfig>, CoreError> {
        let row = sqlx::query("SELECT * FROM cycling_config WHERE series_id = ?")
            .bind(series_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let Some(row) = row else { return Ok(None) };
        let mode: String = row.try_get("mode").map_err(map_sqlx_error)?;
        let item_rows = sqlx::query("SELECT title FROM cycling_item WHERE series_id = ? ORDER BY position")
            .bind(series_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let items = item_rows
            .iter()
            .map(|r| r.try_get::<String, _>("title").map_err(map_sqlx_error))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(CyclingConfig {
            series_id,
            items,
            mode: match mode.as_str() {
                "sequential" => CyclingMode::Sequential,
                "random" => CyclingMode::Random,
                other => return Err(CoreError::InvalidData(format!("unknown cycling mode '{other}'"))),
            },
            gap_leap: row.try_get::<i64, _>("gap_leap").map_err(map_sqlx_error)? != 0,
            current_index: row.try_get::<i64, _>("current_index").map_err(map_sqlx_error)? as u32,
        }))
    }
}

#[async_trait]
impl AdaptiveDurationStore for SqliteStorage {
    async fn upsert_adaptive_duration(&self, config: &AdaptiveDurationConfig) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO adaptive_duration (series_id, fallback_duration, buffer_percent, last_n,
             window_days, min_minutes, max_minutes) VALUES (?,?,?,?,?,?,?)
             ON CONFLICT(series_id) DO UPDATE SET fallback_duration=excluded.fallback_duration,
             buffer_percent=excluded.buffer_percent, last_n=excluded.last_n,
             window_days=excluded.window_days, min_minutes=excluded.min_minutes,
             max_minutes=excluded.max_minutes",
        )
        .bind(config.series_id.to_string())
        .bind(config.fallback_duration as i64)
        .bind(config.buffer_percent)
        .bind(config.last_n as i64)
        .bind(config.window_days as i64)
        .bind(config.min.map(|m| m as i64))
        .bind(config.max.map(|m| m as i64))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_adaptive_duration(&self, series_id: Uuid) -> Result<Option<AdaptiveDurationConfig>, CoreError> {
        let row = sqlx::query("SELECT * FROM adaptive_duration WHERE series_id = ?")
            .bind(series_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(AdaptiveDurationConfig {
            series_id,
            fallback_duration: row.try_get::<i64, _>("fallback_duration").map_err(map_sqlx_error)? as u32,
            buffer_percent: row.try_get("buffer_percent").map_err(map_sqlx_error)?,
            last_n: row.try_get::<i64, _>("last_n").map_err(map_sqlx_error)? as u32,
            window_days: row.try_get::<i64, _>("window_days").map_err(map_sqlx_error)? as u32,
            min: row
                .try_get::<Option<i64>, _>("min_minutes")
                .map_err(map_sqlx_error)?
                .map(|m| m as u32),
            max: row
                .try_get::<Option<i64>, _>("max_minutes")
                .map_err(map_sqlx_error)?
                .map(|m| m as u32),
        }))
    }
}

#[async_trait]
impl LinkStore for SqliteStorage {
    async fn create_link(&self, link: &Link) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO link (parent_series_id, child_series_id, target_distance_minutes,
             early_wobble_minutes, late_wobble_minutes) VALUES (?,?,?,?,?)",
        )
        .bind(link.parent_series_id.to_string())
        .bind(link.child_series_id.to_string())
        .bind(link.target_distance_minutes)
        .bind(link.early_wobble_minutes as i64)
        .bind(link.late_wobble_minutes as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_link_for_child(&self, child_series_id: Uuid) -> Result<Option<Link>, CoreError> {
        let row = sqlx::query("SELECT * FROM link WHERE child_series_id = ?")
            .bind(child_series_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_link).transpose()
    }

    async fn get_links_for_parent(&self, parent_series_id: Uuid) -> Result<Vec<Link>, CoreError> {
        let rows = sqlx::query("SELECT * FROM link WHERE parent_series_id = ?")
            .bind(parent_series_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_link).collect()
    }

    async fn get_all_links(&self) -> Result<Vec<Link>, CoreError> {
        let rows = sqlx::query("SELECT * FROM link")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_link).collect()
    }

    async fn delete_link(&self, child_series_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM link WHERE child_series_id = ?")
            .bind(child_series_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn row_to_link(row: &sqlx::sqlite::SqliteRow) -> Result<Link, CoreError> {
    let parent: String = row.try_get("parent_series_id").map_err(map_sqlx_error)?;
    let child: String = row.try_get("child_series_id").map_err(map_sqlx_error)?;
    Ok(Link {
        parent_series_id: Uuid::parse_str(&parent).map_err(|e| CoreError::InvalidData(e.to_string()))?,
        child_series_id: Uuid::parse_str(&child).map_err(|e| CoreError::InvalidData(e.to_string()))?,
        target_distance_minutes: row.try_get("target_distance_minutes").map_err(map_sqlx_error)?,
        early_wobble_minutes: row.try_get::<i64, _>("early_wobble_minutes").map_err(map_sqlx_error)? as u32,
        late_wobble_minutes: row.try_get::<i64, _>("late_wobble_minutes").map_err(map_sqlx_error)? as u32,
    })
}

#[async_trait]
impl ConstraintStore for SqliteStorage {
    async fn create_constraint(&self, constraint: &RelationalConstraint) -> Result<(), CoreError> {
        let (source_type, source_value) = target_columns(constraint.source);
        let (dest_type, dest_value) = target_columns(constraint.dest);
        let (kind, within) = constraint_kind_columns(constraint.kind);
        sqlx::query(
            "INSERT INTO relational_constraint (id, source_type, source_value, dest_type, dest_value,
             kind, within_minutes) VALUES (?,?,?,?,?,?,?)",
        )
        .bind(constraint.id.to_string())
        .bind(source_type)
        .bind(source_value)
        .bind(dest_type)
        .bind(dest_value)
        .bind(kind)
        .bind(within)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_all_constraints(&self) -> Result<Vec<RelationalConstraint>, CoreError> {
        let rows = sqlx::query("SELECT * FROM relational_constraint")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_constraint).collect()
    }

    async fn delete_constraint(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM relational_constraint WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn target_columns(target: ConstraintTarget) -> (&'static str, String) {
    match target {
        ConstraintTarget::Tag(id) => ("tag", id.to_string()),
        ConstraintTarget::Series(id) => ("series", id.to_string()),
    }
}

fn target_from_columns(kind: &str, value: &str) -> Result<ConstraintTarget, CoreError> {
    let id = Uuid::parse_str(value).map_err(|e| CoreError::InvalidData(e.to_string()))?;
    match kind {
        "tag" => Ok(ConstraintTarget::Tag(id)),
        "series" => Ok(ConstraintTarget::Series(id)),
        other => Err(CoreError::InvalidData(format!("unknown target type '{other}'"))),
    }
}

fn constraint_kind_columns(kind: ConstraintType) -> (&'static str, Option<i64>) {
    match kind {
        ConstraintType::MustBeOnSameDay => ("must_be_on_same_day", None),
        ConstraintType::CantBeOnSameDay => ("cant_be_on_same_day", None),
        ConstraintType::MustBeNextTo => ("must_be_next_to", None),
        ConstraintType::CantBeNextTo => ("cant_be_next_to", None),
        ConstraintType::MustBeBefore => ("must_be_before", None),
        ConstraintType::MustBeAfter => ("must_be_after", None),
        ConstraintType::MustBeWithin(m) => ("must_be_within", Some(m as i64)),
    }
}

fn row_to_constraint(row: &sqlx::sqlite::SqliteRow) -> Result<RelationalConstraint, CoreError> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let source_type: String = row.try_get("source_type").map_err(map_sqlx_error)?;
    let source_value: String = row.try_get("source_value").map_err(map_sqlx_error)?;
    let dest_type: String = row.try_get("dest_type").map_err(map_sqlx_error)?;
    let dest_value: String = row.try_get("dest_value").map_err(map_sqlx_error)?;
    let kind: String = row.try_get("kind").map_err(map_sqlx_error)?;
    let within: Option<i64> = row.try_get("within_minutes").map_err(map_sqlx_error)?;
    Ok(RelationalConstraint {
        id: Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
        source: target_from_columns(&source_type, &source_value)?,
        dest: target_from_columns(&dest_type, &dest_value)?,
        kind: match kind.as_str() {
            "must_be_on_same_day" => ConstraintType::MustBeOnSameDay,
            "cant_be_on_same_day" => ConstraintType::CantBeOnSameDay,
            "must_be_next_to" => ConstraintType::MustBeNextTo,
            "cant_be_next_to" => ConstraintType::CantBeNextTo,
            "must_be_before" => ConstraintType::MustBeBefore,
            "must_be_after" => ConstraintType::MustBeAfter,
            "must_be_within" => ConstraintType::MustBeWithin(
                within.ok_or_else(|| CoreError::InvalidData("missing within_minutes".into()))? as u32,
            ),
            other => return Err(CoreError::InvalidData(format!("unknown constraint kind '{other}'"))),
        },
    })
}

#[async_trait]
impl TagStore for SqliteStorage {
    async fn create_tag(&self, tag: &Tag) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO tag (id, name) VALUES (?,?)")
            .bind(tag.id.to_string())
            .bind(&tag.name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM tag WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn tag_series(&self, series_id: Uuid, tag_id: Uuid) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO series_tag (series_id, tag_id) VALUES (?,?) ON CONFLICT(series_id, tag_id) DO NOTHING",
        )
        .bind(series_id.to_string())
        .bind(tag_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_tags_for_series(&self, series_id: Uuid) -> Result<Vec<Tag>, CoreError> {
        let rows = sqlx::query(
            "SELECT tag.id, tag.name FROM tag INNER JOIN series_tag ON tag.id = series_tag.tag_id
             WHERE series_tag.series_id = ?",
        )
        .bind(series_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(map_sqlx_error)?;
                Ok(Tag {
                    id: Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))?,
                    name: row.try_get("name").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn get_series_for_tag(&self, tag_id: Uuid) -> Result<Vec<Uuid>, CoreError> {
        let rows = sqlx::query("SELECT series_id FROM series_tag WHERE tag_id = ?")
            .bind(tag_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("series_id").map_err(map_sqlx_error)?;
                Uuid::parse_str(&id).map_err(|e| CoreError::InvalidData(e.to_string()))
            })
            .collect()
    }
}
