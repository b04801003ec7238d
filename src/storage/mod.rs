//! SQLite persistence shared by every engine component.
//!
//! Each component owns its own repository over the pool; this module only
//! opens the database and bootstraps the schema.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .with_context(|| format!("Failed to open state DB: {}", db_path.display()))?;

        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Fixed-width UTC timestamps so TEXT comparison in SQL orders correctly.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid RFC3339 timestamp in state DB: {raw}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub(crate) fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS automation_configs (
            location_id      TEXT PRIMARY KEY,
            principal_id     TEXT NOT NULL,
            account_id       TEXT,
            enabled          INTEGER NOT NULL DEFAULT 1,
            posting_enabled  INTEGER NOT NULL DEFAULT 0,
            schedule         TEXT,
            last_run_at      TEXT,
            business         TEXT NOT NULL,
            reply_enabled    INTEGER NOT NULL DEFAULT 0,
            last_check_at    TEXT,
            disabled_reason  TEXT,
            disabled_at      TEXT,
            restore_posting  INTEGER NOT NULL DEFAULT 0,
            restore_reply    INTEGER NOT NULL DEFAULT 0,
            updated_at       TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create automation_configs table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_automation_configs_principal
         ON automation_configs(principal_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create automation_configs index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS credentials (
            principal_id  TEXT PRIMARY KEY,
            access_token  TEXT NOT NULL,
            refresh_token TEXT,
            expires_at    TEXT NOT NULL,
            is_valid      INTEGER NOT NULL DEFAULT 1,
            last_error    TEXT,
            updated_at    TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create credentials table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            principal_id TEXT PRIMARY KEY,
            status       TEXT NOT NULL,
            period_end   TEXT,
            created_at   TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create subscriptions table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS review_replies (
            location_id TEXT NOT NULL,
            review_id   TEXT NOT NULL,
            replied_at  TEXT NOT NULL,
            PRIMARY KEY (location_id, review_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create review_replies table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS activity_log (
            id          TEXT PRIMARY KEY,
            location_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            status      TEXT NOT NULL,
            details     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create activity_log table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activity_log_location
         ON activity_log(location_id, created_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create activity_log index")?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Store;
    use tempfile::TempDir;

    pub(crate) async fn temp_store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("state").join("test.db"))
            .await
            .unwrap();
        (tmp, store)
    }
}
