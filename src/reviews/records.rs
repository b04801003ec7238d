use crate::storage::{Store, format_timestamp};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Reviews already answered by this engine. Append-only.
#[derive(Debug, Clone)]
pub struct ReplyRecordRepository {
    pool: SqlitePool,
}

impl ReplyRecordRepository {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    pub async fn replied_ids(&self, location_id: &str) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT review_id FROM review_replies WHERE location_id = ?")
                .bind(location_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to list replied reviews")?;
        Ok(ids.into_iter().collect())
    }

    /// Returns `false` when the review was already recorded.
    pub async fn record(
        &self,
        location_id: &str,
        review_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO review_replies (location_id, review_id, replied_at)
             VALUES (?, ?, ?)",
        )
        .bind(location_id)
        .bind(review_id)
        .bind(format_timestamp(at))
        .execute(&self.pool)
        .await
        .context("Failed to record review reply")?;
        Ok(result.rows_affected() > 0)
    }
}
