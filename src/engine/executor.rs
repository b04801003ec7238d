use super::Services;
use crate::automation::{AutomationConfig, BusinessMetadata};
use crate::delivery::{PostDraft, Protocol};
use crate::error::AutomationError;
use crate::platform::schedule::{DueHandler, compute_next_due};
use crate::recovery::{ActivityAction, ExecutionLocks};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

// Wall clock and timer clock may disagree by a few milliseconds at wake-up.
const DUE_TOLERANCE_MS: i64 = 1_000;

/// Why a post attempt started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    /// A timer reached its slot.
    Scheduled,
    /// Reconciliation found a slot that passed without a post.
    Recovery,
    /// An operator asked for a post now; ignores the schedule.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PostOutcome {
    Published {
        protocol: Protocol,
        post_name: Option<String>,
        content: String,
        posted_at: DateTime<Utc>,
    },
    /// Someone else already covered the slot.
    NotDue { next_due_at: DateTime<Utc> },
    /// The location or its posting was switched off.
    Inactive,
}

/// Runs one posting attempt end to end under the location's execution lock.
pub struct PostExecutor {
    services: Services,
    locks: Arc<ExecutionLocks>,
    // Published runs whose `last_run_at` write failed; still count as covered.
    unrecorded_runs: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PostExecutor {
    pub fn new(services: Services, locks: Arc<ExecutionLocks>) -> Self {
        Self {
            services,
            locks,
            unrecorded_runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_executing(&self, location_id: &str) -> bool {
        self.locks.is_held(location_id)
    }

    /// Every failure is logged as an activity entry here and returned; none
    /// propagate further than the caller's own logging.
    pub async fn execute(
        &self,
        location_id: &str,
        trigger: Trigger,
        business_override: Option<BusinessMetadata>,
    ) -> Result<PostOutcome, AutomationError> {
        let Some(_guard) = self.locks.try_acquire(location_id) else {
            tracing::debug!(location_id, %trigger, "post already in flight");
            return Err(AutomationError::AlreadyRunning(location_id.to_string()));
        };

        let result = self.run(location_id, trigger, business_override).await;
        self.record(location_id, trigger, &result).await;
        result
    }

    async fn run(
        &self,
        location_id: &str,
        trigger: Trigger,
        business_override: Option<BusinessMetadata>,
    ) -> Result<PostOutcome, AutomationError> {
        let mut config = self
            .services
            .automations
            .get(location_id)
            .await?
            .ok_or_else(|| AutomationError::LocationNotFound(location_id.to_string()))?;
        self.settle_unrecorded_run(&mut config).await;

        let now = Utc::now();
        if let Some(skip) = check_due(&config, trigger, now)? {
            return Ok(skip);
        }

        let target = self.services.authorize(&config).await?;
        let business = business_override.unwrap_or_else(|| config.posting.business.clone());
        let generated = self.services.content.generate_post(&business, None).await?;

        let draft = PostDraft {
            content: generated.content,
            learn_more_url: business
                .website_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
        };
        let published = self.services.delivery.publish_post(&target, &draft).await?;

        let posted_at = Utc::now();
        match self
            .services
            .automations
            .record_post_run(location_id, posted_at)
            .await
        {
            Ok(()) => {
                self.unrecorded_runs().remove(location_id);
            }
            Err(error) => {
                tracing::error!(location_id, error = %format!("{error:#}"), "published but last run not stored; holding it in memory");
                self.unrecorded_runs()
                    .insert(location_id.to_string(), posted_at);
            }
        }

        Ok(PostOutcome::Published {
            protocol: published.protocol,
            post_name: published.name,
            content: draft.content,
            posted_at,
        })
    }

    fn unrecorded_runs(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.unrecorded_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Folds a run that was published but never stored into `config`, and
    /// retries storing it.
    async fn settle_unrecorded_run(&self, config: &mut AutomationConfig) {
        let Some(posted_at) = self.unrecorded_runs().get(&config.location_id).copied() else {
            return;
        };
        if config
            .posting
            .last_run_at
            .is_some_and(|stored| stored >= posted_at)
        {
            self.unrecorded_runs().remove(&config.location_id);
            return;
        }
        config.posting.last_run_at = Some(posted_at);
        match self
            .services
            .automations
            .record_post_run(&config.location_id, posted_at)
            .await
        {
            Ok(()) => {
                self.unrecorded_runs().remove(&config.location_id);
                tracing::info!(location_id = %config.location_id, %posted_at, "stored held-back last run");
            }
            Err(error) => {
                tracing::warn!(location_id = %config.location_id, error = %format!("{error:#}"), "last run still not stored");
            }
        }
    }

    async fn record(
        &self,
        location_id: &str,
        trigger: Trigger,
        result: &Result<PostOutcome, AutomationError>,
    ) {
        let logged = match result {
            Ok(PostOutcome::Published {
                protocol,
                post_name,
                content,
                ..
            }) => {
                tracing::info!(location_id, %trigger, %protocol, "post published");
                self.services
                    .activity
                    .record_success(
                        location_id,
                        ActivityAction::Post,
                        json!({
                            "trigger": trigger,
                            "protocol": protocol,
                            "post_name": post_name,
                            "words": content.split_whitespace().count(),
                        }),
                    )
                    .await
            }
            Ok(outcome) => {
                tracing::debug!(location_id, %trigger, ?outcome, "nothing to post");
                Ok(())
            }
            Err(AutomationError::LocationNotFound(_)) => Ok(()),
            Err(error) => {
                if error.is_skip() {
                    tracing::info!(location_id, %trigger, code = error.code(), %error, "post skipped");
                } else {
                    tracing::error!(location_id, %trigger, code = error.code(), %error, "post failed");
                }
                self.services
                    .activity
                    .record_error(
                        location_id,
                        ActivityAction::Post,
                        error,
                        json!({ "trigger": trigger }),
                    )
                    .await
            }
        };
        if let Err(error) = logged {
            tracing::error!(location_id, error = %error, "failed to write activity entry");
        }
    }
}

/// `Some` when the attempt should stop before any outbound call.
fn check_due(
    config: &AutomationConfig,
    trigger: Trigger,
    now: DateTime<Utc>,
) -> Result<Option<PostOutcome>, AutomationError> {
    if trigger == Trigger::Manual {
        return Ok((!config.enabled).then_some(PostOutcome::Inactive));
    }
    if !config.posting_active() {
        return Ok(Some(PostOutcome::Inactive));
    }
    let policy = config
        .posting
        .schedule
        .as_ref()
        .ok_or_else(|| AutomationError::ConfigurationMissing {
            location_id: config.location_id.clone(),
        })?;

    let last_run_at = config.posting.last_run_at;
    let next_due_at = compute_next_due(policy, last_run_at, now);
    let due = match (trigger, last_run_at) {
        // Nothing was ever posted, so reconciliation has no missed slot.
        (Trigger::Recovery, None) => false,
        (Trigger::Scheduled, None) => true,
        _ => next_due_at <= now + Duration::milliseconds(DUE_TOLERANCE_MS),
    };
    Ok((!due).then_some(PostOutcome::NotDue { next_due_at }))
}

impl DueHandler for PostExecutor {
    fn run_due<'a>(&'a self, location_id: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            // Outcomes are already logged by `execute`.
            let _ = self.execute(location_id, Trigger::Scheduled, None).await;
        })
    }
}
