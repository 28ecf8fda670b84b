//! Connection bootstrap and migration runner, grounded directly on
//! `task-core/src/db.rs::establish_connection`.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::CoreError;

pub type DbPool = SqlitePool;

/// Open (creating if absent) the sqlite database at `db_path` and run
/// pending migrations inside a transaction, recording the applied version
/// only on success (spec.md §3 schema version, §6 migration semantics).
pub async fn establish_connection(db_path: &str) -> Result<DbPool, CoreError> {
    if db_path != ":memory:" {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }
    }

    let url = if db_path == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite://{db_path}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
