use super::types::{
    AutomationConfig, BusinessMetadata, DisableReason, DisabledState, PostingConfig, ReplyConfig,
    SchedulePolicy,
};
use crate::storage::{
    Store, format_timestamp, parse_optional_timestamp, parse_timestamp,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

const SELECT_COLUMNS: &str = "location_id, principal_id, account_id, enabled, posting_enabled,
    schedule, last_run_at, business, reply_enabled, last_check_at, disabled_reason, disabled_at";

/// Persistence for [`AutomationConfig`] rows, keyed by `location_id`.
#[derive(Debug, Clone)]
pub struct AutomationRepository {
    pool: SqlitePool,
}

impl AutomationRepository {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    pub async fn upsert(&self, config: &AutomationConfig) -> Result<()> {
        let schedule = config
            .posting
            .schedule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode posting schedule")?;
        let business = serde_json::to_string(&config.posting.business)
            .context("Failed to encode business metadata")?;

        sqlx::query(
            "INSERT INTO automation_configs (
                location_id, principal_id, account_id, enabled, posting_enabled, schedule,
                last_run_at, business, reply_enabled, last_check_at, disabled_reason,
                disabled_at, restore_posting, restore_reply, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
             ON CONFLICT(location_id) DO UPDATE SET
                principal_id = excluded.principal_id,
                account_id = excluded.account_id,
                enabled = excluded.enabled,
                posting_enabled = excluded.posting_enabled,
                schedule = excluded.schedule,
                last_run_at = excluded.last_run_at,
                business = excluded.business,
                reply_enabled = excluded.reply_enabled,
                last_check_at = excluded.last_check_at,
                disabled_reason = excluded.disabled_reason,
                disabled_at = excluded.disabled_at,
                restore_posting = 0,
                restore_reply = 0,
                updated_at = excluded.updated_at",
        )
        .bind(&config.location_id)
        .bind(&config.principal_id)
        .bind(config.account_id.as_deref())
        .bind(config.enabled)
        .bind(config.posting.enabled)
        .bind(schedule)
        .bind(config.posting.last_run_at.map(format_timestamp))
        .bind(business)
        .bind(config.reply.enabled)
        .bind(config.reply.last_check_at.map(format_timestamp))
        .bind(config.disabled.as_ref().map(|d| d.reason.to_string()))
        .bind(config.disabled.as_ref().map(|d| format_timestamp(d.at)))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save automation config {}", config.location_id))?;

        Ok(())
    }

    pub async fn get(&self, location_id: &str) -> Result<Option<AutomationConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM automation_configs WHERE location_id = ?"
        ))
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load automation config")?;

        row.as_ref().map(row_to_config).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<AutomationConfig>> {
        self.fetch_many(&format!(
            "SELECT {SELECT_COLUMNS} FROM automation_configs ORDER BY location_id ASC"
        ))
        .await
    }

    /// Locations with at least one automation switched on.
    pub async fn list_enabled(&self) -> Result<Vec<AutomationConfig>> {
        self.fetch_many(&format!(
            "SELECT {SELECT_COLUMNS} FROM automation_configs
             WHERE enabled = 1 AND (posting_enabled = 1 OR reply_enabled = 1)
             ORDER BY location_id ASC"
        ))
        .await
    }

    pub async fn list_for_principal(&self, principal_id: &str) -> Result<Vec<AutomationConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM automation_configs
             WHERE principal_id = ? ORDER BY location_id ASC"
        ))
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list automation configs for principal")?;

        rows.iter().map(row_to_config).collect()
    }

    pub async fn record_post_run(&self, location_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE automation_configs SET last_run_at = ?, updated_at = ? WHERE location_id = ?",
        )
        .bind(format_timestamp(at))
        .bind(format_timestamp(Utc::now()))
        .bind(location_id)
        .execute(&self.pool)
        .await
        .context("Failed to record post run")?;
        Ok(())
    }

    pub async fn record_review_check(&self, location_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE automation_configs SET last_check_at = ?, updated_at = ? WHERE location_id = ?",
        )
        .bind(format_timestamp(at))
        .bind(format_timestamp(Utc::now()))
        .bind(location_id)
        .execute(&self.pool)
        .await
        .context("Failed to record review check")?;
        Ok(())
    }

    /// Switches everything off for one location. Returns `false` if unknown.
    pub async fn disable_manual(&self, location_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE automation_configs
             SET enabled = 0, disabled_reason = ?, disabled_at = ?, updated_at = ?
             WHERE location_id = ?",
        )
        .bind(DisableReason::Manual.to_string())
        .bind(format_timestamp(at))
        .bind(format_timestamp(Utc::now()))
        .bind(location_id)
        .execute(&self.pool)
        .await
        .context("Failed to disable automation config")?;
        Ok(result.rows_affected() > 0)
    }

    /// Turns off posting and replies for every location of `principal_id`,
    /// remembering which switches were on. Locations already carrying a
    /// disable annotation are left alone. Returns the affected location ids.
    pub async fn disable_for_entitlement(
        &self,
        principal_id: &str,
        reason: DisableReason,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let affected: Vec<String> = sqlx::query_scalar(
            "SELECT location_id FROM automation_configs
             WHERE principal_id = ?
               AND disabled_reason IS NULL
               AND (posting_enabled = 1 OR reply_enabled = 1)
             ORDER BY location_id ASC",
        )
        .bind(principal_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to select configs for entitlement disable")?;

        // SET expressions read pre-update values, so the restore flags capture
        // the switches before they are cleared.
        sqlx::query(
            "UPDATE automation_configs
             SET restore_posting = posting_enabled,
                 restore_reply = reply_enabled,
                 posting_enabled = 0,
                 reply_enabled = 0,
                 disabled_reason = ?,
                 disabled_at = ?,
                 updated_at = ?
             WHERE principal_id = ?
               AND disabled_reason IS NULL
               AND (posting_enabled = 1 OR reply_enabled = 1)",
        )
        .bind(reason.to_string())
        .bind(format_timestamp(at))
        .bind(format_timestamp(Utc::now()))
        .bind(principal_id)
        .execute(&mut *tx)
        .await
        .context("Failed to disable configs for entitlement")?;

        tx.commit().await?;
        Ok(affected)
    }

    /// Undoes [`Self::disable_for_entitlement`] for `principal_id`. Configs
    /// disabled manually are untouched. Returns the re-enabled location ids.
    pub async fn reenable_after_entitlement(&self, principal_id: &str) -> Result<Vec<String>> {
        let [a, b, c] = DisableReason::ENTITLEMENT_REASONS.map(|r| r.to_string());
        let mut tx = self.pool.begin().await?;

        let affected: Vec<String> = sqlx::query_scalar(
            "SELECT location_id FROM automation_configs
             WHERE principal_id = ? AND disabled_reason IN (?, ?, ?)
             ORDER BY location_id ASC",
        )
        .bind(principal_id)
        .bind(&a)
        .bind(&b)
        .bind(&c)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to select configs for re-enable")?;

        sqlx::query(
            "UPDATE automation_configs
             SET posting_enabled = restore_posting,
                 reply_enabled = restore_reply,
                 restore_posting = 0,
                 restore_reply = 0,
                 disabled_reason = NULL,
                 disabled_at = NULL,
                 updated_at = ?
             WHERE principal_id = ? AND disabled_reason IN (?, ?, ?)",
        )
        .bind(format_timestamp(Utc::now()))
        .bind(principal_id)
        .bind(&a)
        .bind(&b)
        .bind(&c)
        .execute(&mut *tx)
        .await
        .context("Failed to re-enable configs")?;

        tx.commit().await?;
        Ok(affected)
    }

    async fn fetch_many(&self, sql: &str) -> Result<Vec<AutomationConfig>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list automation configs")?;
        rows.iter().map(row_to_config).collect()
    }
}

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<AutomationConfig> {
    let location_id: String = row.get("location_id");
    let schedule_raw: Option<String> = row.get("schedule");
    let business_raw: String = row.get("business");
    let disabled_reason_raw: Option<String> = row.get("disabled_reason");
    let disabled_at_raw: Option<String> = row.get("disabled_at");

    let schedule: Option<SchedulePolicy> = schedule_raw
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .with_context(|| format!("Corrupt schedule for location {location_id}"))?;
    let business: BusinessMetadata = serde_json::from_str(&business_raw)
        .with_context(|| format!("Corrupt business metadata for location {location_id}"))?;

    let disabled = match (disabled_reason_raw, disabled_at_raw) {
        (Some(reason), Some(at)) => Some(DisabledState {
            reason: DisableReason::from_str(&reason)
                .with_context(|| format!("Unknown disable reason '{reason}'"))?,
            at: parse_timestamp(&at)?,
        }),
        _ => None,
    };

    Ok(AutomationConfig {
        principal_id: row.get("principal_id"),
        account_id: row.get("account_id"),
        enabled: row.get("enabled"),
        posting: PostingConfig {
            enabled: row.get("posting_enabled"),
            schedule,
            last_run_at: parse_optional_timestamp(row.get("last_run_at"))?,
            business,
        },
        reply: ReplyConfig {
            enabled: row.get("reply_enabled"),
            last_check_at: parse_optional_timestamp(row.get("last_check_at"))?,
        },
        disabled,
        location_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::types::Frequency;
    use crate::storage::testing::temp_store;
    use chrono::NaiveTime;

    fn sample(location_id: &str, principal_id: &str) -> AutomationConfig {
        AutomationConfig {
            location_id: location_id.into(),
            principal_id: principal_id.into(),
            account_id: Some("acc-1".into()),
            enabled: true,
            posting: PostingConfig {
                enabled: true,
                schedule: Some(SchedulePolicy {
                    frequency: Frequency::Daily,
                    time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    timezone: chrono_tz::Europe::Berlin,
                }),
                last_run_at: None,
                business: BusinessMetadata {
                    name: "Blue Cafe".into(),
                    address: "1 Main St".into(),
                    ..BusinessMetadata::default()
                },
            },
            reply: ReplyConfig {
                enabled: true,
                last_check_at: None,
            },
            disabled: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let (_tmp, store) = temp_store().await;
        let repo = AutomationRepository::new(&store);
        let config = sample("loc-1", "p-1");

        repo.upsert(&config).await.unwrap();
        let loaded = repo.get("loc-1").await.unwrap().unwrap();

        assert_eq!(loaded, config);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_post_run_updates_last_run() {
        let (_tmp, store) = temp_store().await;
        let repo = AutomationRepository::new(&store);
        repo.upsert(&sample("loc-1", "p-1")).await.unwrap();

        let at = Utc::now();
        repo.record_post_run("loc-1", at).await.unwrap();
        let loaded = repo.get("loc-1").await.unwrap().unwrap();

        assert_eq!(
            loaded.posting.last_run_at.map(format_timestamp),
            Some(format_timestamp(at))
        );
    }

    #[tokio::test]
    async fn entitlement_disable_and_reenable_restores_prior_switches() {
        let (_tmp, store) = temp_store().await;
        let repo = AutomationRepository::new(&store);

        let mut posting_only = sample("loc-a", "p-1");
        posting_only.reply.enabled = false;
        repo.upsert(&posting_only).await.unwrap();
        repo.upsert(&sample("loc-b", "p-1")).await.unwrap();
        repo.upsert(&sample("loc-other", "p-2")).await.unwrap();

        let disabled = repo
            .disable_for_entitlement("p-1", DisableReason::TrialExpired, Utc::now())
            .await
            .unwrap();
        assert_eq!(disabled, vec!["loc-a".to_string(), "loc-b".to_string()]);

        let a = repo.get("loc-a").await.unwrap().unwrap();
        assert!(!a.posting.enabled && !a.reply.enabled);
        assert_eq!(a.disabled.unwrap().reason, DisableReason::TrialExpired);
        assert!(repo.get("loc-other").await.unwrap().unwrap().posting.enabled);

        let reenabled = repo.reenable_after_entitlement("p-1").await.unwrap();
        assert_eq!(reenabled.len(), 2);

        let a = repo.get("loc-a").await.unwrap().unwrap();
        assert!(a.posting.enabled);
        assert!(!a.reply.enabled, "reply was off before the disable");
        assert!(a.disabled.is_none());
    }

    #[tokio::test]
    async fn manual_disable_survives_renewal() {
        let (_tmp, store) = temp_store().await;
        let repo = AutomationRepository::new(&store);
        repo.upsert(&sample("loc-1", "p-1")).await.unwrap();

        assert!(repo.disable_manual("loc-1", Utc::now()).await.unwrap());
        assert!(!repo.disable_manual("nope", Utc::now()).await.unwrap());

        let second_disable = repo
            .disable_for_entitlement("p-1", DisableReason::SubscriptionExpired, Utc::now())
            .await
            .unwrap();
        assert!(second_disable.is_empty());
        assert!(repo.reenable_after_entitlement("p-1").await.unwrap().is_empty());

        let loaded = repo.get("loc-1").await.unwrap().unwrap();
        assert!(!loaded.enabled);
        assert_eq!(loaded.disabled.unwrap().reason, DisableReason::Manual);
    }

    #[tokio::test]
    async fn list_enabled_skips_switched_off_locations() {
        let (_tmp, store) = temp_store().await;
        let repo = AutomationRepository::new(&store);

        let mut off = sample("loc-off", "p-1");
        off.posting.enabled = false;
        off.reply.enabled = false;
        repo.upsert(&off).await.unwrap();
        repo.upsert(&sample("loc-on", "p-1")).await.unwrap();

        let enabled = repo.list_enabled().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].location_id, "loc-on");
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
        assert_eq!(repo.list_for_principal("p-1").await.unwrap().len(), 2);
    }
}
