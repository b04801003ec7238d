//! The automation engine: wires storage, adapters, timers and pollers
//! together and exposes the operations the route layer and CLI call.

mod executor;
mod services;
mod status;

pub use executor::{PostExecutor, PostOutcome, Trigger};
pub use services::Services;
pub use status::LocationStatus;

use crate::automation::{
    AutomationConfig, AutomationRepository, BusinessMetadata, ConfigUpdate,
};
use crate::config::Config;
use crate::content::{ContentGenerator, ContentProvider, OpenAiCompatibleProvider};
use crate::credentials::{CredentialStore, OAuthRefresher, TokenRefresher};
use crate::delivery::DualProtocolDelivery;
use crate::entitlement::{EntitlementGuard, SubscriptionRepository};
use crate::error::AutomationError;
use crate::platform::schedule::{ScheduleManager, compute_next_due};
use crate::recovery::{ActivityAction, ActivityLog, ExecutionLocks, ReconcileReport, Reconciler};
use crate::reviews::{ReplyRecordRepository, ReviewCycleOutcome, ReviewMonitor, ReviewWorker};
use crate::security::SecretStore;
use crate::storage::Store;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

const RECENT_ACTIVITY_LIMIT: u32 = 10;

/// The outbound adapters. Tests swap in stubs here.
pub struct EngineParts {
    pub content: Arc<dyn ContentProvider>,
    pub delivery: DualProtocolDelivery,
    pub refresher: Arc<dyn TokenRefresher>,
}

impl EngineParts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            content: Arc::new(OpenAiCompatibleProvider::from_config(&config.content)),
            delivery: DualProtocolDelivery::from_config(&config.delivery),
            refresher: Arc::new(OAuthRefresher::from_config(&config.credentials)),
        }
    }
}

pub struct Engine {
    services: Services,
    executor: Arc<PostExecutor>,
    schedule: ScheduleManager,
    reviews: ReviewMonitor,
    reconciler: Reconciler,
    test_interval_secs: u64,
}

impl Engine {
    /// Opens the workspace database and builds the HTTP-backed adapters.
    /// Nothing is scheduled until [`Engine::start`].
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let store = Store::open(&config.database_path()).await?;
        Ok(Self::new(
            config,
            &store,
            config.secret_store(),
            EngineParts::from_config(config),
        ))
    }

    pub fn new(config: &Config, store: &Store, secrets: SecretStore, parts: EngineParts) -> Self {
        let automations = AutomationRepository::new(store);
        let activity = ActivityLog::new(store, config.recovery.activity_retention);
        let services = Services {
            automations: automations.clone(),
            entitlement: Arc::new(EntitlementGuard::new(
                SubscriptionRepository::new(store),
                automations.clone(),
                &config.entitlement,
            )),
            credentials: Arc::new(CredentialStore::new(
                store,
                secrets,
                parts.refresher,
                &config.credentials,
            )),
            content: Arc::new(ContentGenerator::new(parts.content, &config.content)),
            delivery: Arc::new(parts.delivery),
            activity: activity.clone(),
        };

        let executor = Arc::new(PostExecutor::new(services.clone(), ExecutionLocks::new()));
        let schedule = ScheduleManager::new(automations.clone(), executor.clone());
        let worker = Arc::new(ReviewWorker::new(
            services.clone(),
            ReplyRecordRepository::new(store),
            &config.reviews,
        ));
        let reviews = ReviewMonitor::new(worker, &config.reviews);
        let reconciler = Reconciler::new(
            automations,
            activity,
            Arc::clone(&executor),
            config.recovery.failure_cooldown_secs,
        );

        Self {
            services,
            executor,
            schedule,
            reviews,
            reconciler,
            test_interval_secs: config.scheduler.test_interval_secs,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Installs timers and pollers for every enabled location, then catches
    /// up on slots missed while the process was down.
    pub async fn start(&self) -> Result<ReconcileReport, AutomationError> {
        let synced = self.sync().await?;
        tracing::info!(locations = synced, "automation engine started");
        self.reconcile().await
    }

    /// Brings timers and pollers in line with stored configuration, after
    /// giving principals disabled for entitlement a chance to come back.
    pub async fn sync(&self) -> Result<usize, AutomationError> {
        self.restore_renewed().await?;
        let configs = self.services.automations.list_enabled().await?;
        self.schedule.sync_all(&configs);
        self.reviews.sync_all(&configs);
        Ok(configs.len())
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, AutomationError> {
        let report = self.reconciler.reconcile().await?;
        if !report.executed.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                executed = report.executed.len(),
                failed = report.failed.len(),
                skipped_locked = report.skipped_locked.len(),
                skipped_cooldown = report.skipped_cooldown.len(),
                "reconciliation pass finished"
            );
        }
        Ok(report)
    }

    /// Stores a new configuration and reinstalls the location's timer and
    /// poller from scratch.
    pub async fn update_config(
        &self,
        location_id: &str,
        update: ConfigUpdate,
    ) -> Result<AutomationConfig, AutomationError> {
        let previous = self.services.automations.get(location_id).await?;
        let config = update
            .resolve(location_id, previous.as_ref(), self.test_interval_secs)
            .map_err(|error| AutomationError::InvalidConfiguration(format!("{error:#}")))?;
        self.services.automations.upsert(&config).await?;

        self.schedule.cancel(location_id);
        self.schedule.sync(&config);
        self.reviews.start_monitoring(&config);

        tracing::info!(
            location_id,
            posting = config.posting_active(),
            reply = config.reply_active(),
            "automation config updated"
        );
        self.services
            .activity
            .record_success(
                location_id,
                ActivityAction::ConfigUpdate,
                json!({
                    "enabled": config.enabled,
                    "posting_enabled": config.posting.enabled,
                    "reply_enabled": config.reply.enabled,
                    "frequency": config.posting.schedule.as_ref().map(|p| p.frequency.as_label()),
                }),
            )
            .await?;
        Ok(config)
    }

    /// Posts immediately, outside the schedule. `business_override` replaces
    /// the stored business details for this one post.
    pub async fn trigger_post_now(
        &self,
        location_id: &str,
        business_override: Option<BusinessMetadata>,
    ) -> Result<PostOutcome, AutomationError> {
        self.executor
            .execute(location_id, Trigger::Manual, business_override)
            .await
    }

    pub async fn trigger_review_check_now(
        &self,
        location_id: &str,
    ) -> Result<ReviewCycleOutcome, AutomationError> {
        self.reviews.check_now(location_id).await
    }

    /// Switches the location off until it is reconfigured. Work already
    /// under way finishes; nothing new starts.
    pub async fn disable_location(&self, location_id: &str) -> Result<(), AutomationError> {
        if !self
            .services
            .automations
            .disable_manual(location_id, Utc::now())
            .await?
        {
            return Err(AutomationError::LocationNotFound(location_id.to_string()));
        }
        self.schedule.cancel(location_id);
        self.reviews.stop_monitoring(location_id);

        tracing::info!(location_id, "location disabled");
        self.services
            .activity
            .record_success(location_id, ActivityAction::Disable, json!({ "reason": "manual" }))
            .await?;
        Ok(())
    }

    pub async fn get_status(&self, location_id: &str) -> Result<LocationStatus, AutomationError> {
        let config = self
            .services
            .automations
            .get(location_id)
            .await?
            .ok_or_else(|| AutomationError::LocationNotFound(location_id.to_string()))?;
        self.status_for(&config).await
    }

    pub async fn get_all_statuses(&self) -> Result<Vec<LocationStatus>, AutomationError> {
        let configs = self.services.automations.list_all().await?;
        let mut statuses = Vec::with_capacity(configs.len());
        for config in &configs {
            statuses.push(self.status_for(config).await?);
        }
        Ok(statuses)
    }

    pub fn active_timers(&self) -> usize {
        self.schedule.active_count()
    }

    pub fn active_pollers(&self) -> usize {
        self.reviews.active_count()
    }

    pub fn shutdown(&self) {
        self.schedule.shutdown();
        self.reviews.shutdown();
        tracing::info!("automation engine stopped");
    }

    async fn restore_renewed(&self) -> Result<(), AutomationError> {
        let lapsed: BTreeSet<String> = self
            .services
            .automations
            .list_all()
            .await?
            .into_iter()
            .filter(|c| c.disabled.as_ref().is_some_and(|d| d.reason.is_entitlement()))
            .map(|c| c.principal_id)
            .collect();
        for principal_id in lapsed {
            self.services.entitlement.enforce(&principal_id).await?;
        }
        Ok(())
    }

    async fn status_for(&self, config: &AutomationConfig) -> Result<LocationStatus, AutomationError> {
        let location_id = config.location_id.as_str();
        let next_due_at = config
            .posting
            .schedule
            .as_ref()
            .filter(|_| config.posting_active())
            .map(|policy| compute_next_due(policy, config.posting.last_run_at, Utc::now()));

        let mut status = LocationStatus::new(config, next_due_at);
        status.timer_active = self.schedule.is_active(location_id);
        status.poller_active = self.reviews.is_active(location_id);
        status.executing =
            self.executor.is_executing(location_id) || self.reviews.is_checking(location_id);
        status.recent_activity = self
            .services
            .activity
            .recent(location_id, RECENT_ACTIVITY_LIMIT)
            .await?;
        Ok(status)
    }
}

#[cfg(test)]
pub(crate) mod testing;
