use super::types::{Subscription, SubscriptionStatus};
use crate::storage::{Store, format_timestamp, parse_optional_timestamp, parse_timestamp};
use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    pub async fn get(&self, principal_id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query(
            "SELECT principal_id, status, period_end, created_at
             FROM subscriptions WHERE principal_id = ?",
        )
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load subscription")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let created_at: String = row.get("created_at");
        Ok(Some(Subscription {
            principal_id: row.get("principal_id"),
            status: SubscriptionStatus::from_str(&status)
                .with_context(|| format!("Unknown subscription status '{status}'"))?,
            period_end: parse_optional_timestamp(row.get("period_end"))?,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    pub async fn upsert(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (principal_id, status, period_end, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(principal_id) DO UPDATE SET
                status = excluded.status,
                period_end = excluded.period_end",
        )
        .bind(&subscription.principal_id)
        .bind(subscription.status.to_string())
        .bind(subscription.period_end.map(format_timestamp))
        .bind(format_timestamp(subscription.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save subscription")?;
        Ok(())
    }
}
