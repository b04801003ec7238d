use super::activity::{ActivityAction, ActivityLog};
use crate::automation::AutomationRepository;
use crate::engine::{PostExecutor, PostOutcome, Trigger};
use crate::error::AutomationError;
use crate::platform::schedule::compute_next_due;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

/// What one reconciliation pass did, by location id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub executed: Vec<String>,
    pub skipped_locked: Vec<String>,
    pub skipped_cooldown: Vec<String>,
    pub failed: Vec<String>,
}

/// Finds posting slots that passed without a post and runs them once.
pub struct Reconciler {
    automations: AutomationRepository,
    activity: ActivityLog,
    executor: Arc<PostExecutor>,
    failure_cooldown: Duration,
}

impl Reconciler {
    pub fn new(
        automations: AutomationRepository,
        activity: ActivityLog,
        executor: Arc<PostExecutor>,
        failure_cooldown_secs: u64,
    ) -> Self {
        Self {
            automations,
            activity,
            executor,
            failure_cooldown: Duration::seconds(
                i64::try_from(failure_cooldown_secs).unwrap_or(i64::MAX / 1_000),
            ),
        }
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, AutomationError> {
        let configs = self.automations.list_enabled().await?;
        let now = Utc::now();
        let mut report = ReconcileReport::default();
        let mut runs = JoinSet::new();

        for config in configs.iter().filter(|c| c.posting_active()) {
            let (Some(policy), Some(last_run_at)) =
                (config.posting.schedule.as_ref(), config.posting.last_run_at)
            else {
                continue;
            };
            report.checked += 1;
            if compute_next_due(policy, Some(last_run_at), now) > now {
                continue;
            }

            let location_id = config.location_id.clone();
            if self.executor.is_executing(&location_id) {
                report.skipped_locked.push(location_id);
                continue;
            }
            if let Some(failed_at) = self
                .activity
                .last_failure_at(&location_id, ActivityAction::Post)
                .await?
                && now - failed_at < self.failure_cooldown
            {
                tracing::debug!(%location_id, %failed_at, "recent failure, leaving slot for later");
                report.skipped_cooldown.push(location_id);
                continue;
            }

            tracing::info!(%location_id, last_run_at = %last_run_at, "catching up missed posting slot");
            let executor = Arc::clone(&self.executor);
            runs.spawn(async move {
                let result = executor.execute(&location_id, Trigger::Recovery, None).await;
                (location_id, result)
            });
        }

        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok((location_id, Ok(PostOutcome::Published { .. }))) => {
                    report.executed.push(location_id);
                }
                Ok((_, Ok(_))) => {}
                Ok((location_id, Err(AutomationError::AlreadyRunning(_)))) => {
                    report.skipped_locked.push(location_id);
                }
                Ok((location_id, Err(_))) => report.failed.push(location_id),
                Err(error) => tracing::error!(%error, "reconciliation task panicked"),
            }
        }

        report.executed.sort();
        report.failed.sort();
        Ok(report)
    }
}
