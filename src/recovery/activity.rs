use crate::error::AutomationError;
use crate::storage::{Store, format_timestamp, parse_timestamp};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub const STATUS_SUCCESS: &str = "success";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityAction {
    Post,
    ReviewCheck,
    ReviewReply,
    ConfigUpdate,
    Disable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub id: String,
    pub location_id: String,
    pub action: ActivityAction,
    /// `success` or the [`AutomationError::code`] of the failure.
    pub status: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    pub fn is_skip(&self) -> bool {
        self.details
            .get("skipped")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// A real failure: neither a success nor an expected skip.
    pub fn is_failure(&self) -> bool {
        !self.is_success() && !self.is_skip()
    }
}

/// Append-only, per-location history capped at `retention` entries.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    pool: SqlitePool,
    retention: u32,
}

impl ActivityLog {
    pub fn new(store: &Store, retention: u32) -> Self {
        Self {
            pool: store.pool().clone(),
            retention: retention.max(1),
        }
    }

    pub async fn record(
        &self,
        location_id: &str,
        action: ActivityAction,
        status: &str,
        details: Value,
    ) -> Result<()> {
        let details_raw =
            serde_json::to_string(&details).context("Failed to encode activity details")?;
        sqlx::query(
            "INSERT INTO activity_log (id, location_id, action_type, status, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(location_id)
        .bind(action.as_ref())
        .bind(status)
        .bind(details_raw)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .context("Failed to insert activity entry")?;

        sqlx::query(
            "DELETE FROM activity_log
             WHERE location_id = ?
               AND rowid NOT IN (
                   SELECT rowid FROM activity_log
                   WHERE location_id = ?
                   ORDER BY created_at DESC, rowid DESC
                   LIMIT ?
               )",
        )
        .bind(location_id)
        .bind(location_id)
        .bind(i64::from(self.retention))
        .execute(&self.pool)
        .await
        .context("Failed to prune activity log")?;
        Ok(())
    }

    pub async fn record_success(
        &self,
        location_id: &str,
        action: ActivityAction,
        details: Value,
    ) -> Result<()> {
        self.record(location_id, action, STATUS_SUCCESS, details).await
    }

    pub async fn record_error(
        &self,
        location_id: &str,
        action: ActivityAction,
        error: &AutomationError,
        mut details: Value,
    ) -> Result<()> {
        let extra = json!({
            "error": error.to_string(),
            "skipped": error.is_skip(),
        });
        match (&mut details, extra) {
            (Value::Object(map), Value::Object(extra)) => map.extend(extra),
            (slot, extra) => *slot = extra,
        }
        self.record(location_id, action, error.code(), details).await
    }

    /// Newest first.
    pub async fn recent(&self, location_id: &str, limit: u32) -> Result<Vec<ActivityEntry>> {
        let rows = sqlx::query(
            "SELECT id, location_id, action_type, status, details, created_at
             FROM activity_log
             WHERE location_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(location_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list activity entries")?;
        rows.iter().map(row_to_entry).collect()
    }

    /// When the latest `action` entry for the location is a failure, its time.
    pub async fn last_failure_at(
        &self,
        location_id: &str,
        action: ActivityAction,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT id, location_id, action_type, status, details, created_at
             FROM activity_log
             WHERE location_id = ? AND action_type = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
        )
        .bind(location_id)
        .bind(action.as_ref())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest activity entry")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let entry = row_to_entry(&row)?;
        Ok(entry.is_failure().then_some(entry.created_at))
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ActivityEntry> {
    let action_raw: String = row.get("action_type");
    let details_raw: String = row.get("details");
    let created_at_raw: String = row.get("created_at");

    Ok(ActivityEntry {
        id: row.get("id"),
        location_id: row.get("location_id"),
        action: ActivityAction::from_str(&action_raw)
            .with_context(|| format!("Unknown activity action '{action_raw}'"))?,
        status: row.get("status"),
        details: serde_json::from_str(&details_raw).unwrap_or(Value::Null),
        created_at: parse_timestamp(&created_at_raw)?,
    })
}
