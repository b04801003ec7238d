//! Review polling and automatic replies.
//!
//! One poller task per location checks on a fixed interval, starting with an
//! immediate check. A review is answered at most once: anything already in
//! the reply records, or already carrying a reply upstream, is skipped.

mod records;

pub use records::ReplyRecordRepository;

use crate::automation::AutomationConfig;
use crate::config::ReviewsConfig;
use crate::delivery::{DeliveryTarget, Protocol, Review};
use crate::engine::Services;
use crate::error::AutomationError;
use crate::recovery::{ActivityAction, ExecutionLocks};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What one review check did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewCycleOutcome {
    /// `false` when replies are switched off for the location.
    pub ran: bool,
    pub fetched: usize,
    pub pending: usize,
    pub replied: usize,
    pub failed: usize,
    pub protocol: Option<Protocol>,
}

pub struct ReviewWorker {
    services: Services,
    replies: ReplyRecordRepository,
    locks: Arc<ExecutionLocks>,
    inter_reply_delay: Duration,
}

impl ReviewWorker {
    pub fn new(services: Services, replies: ReplyRecordRepository, config: &ReviewsConfig) -> Self {
        Self {
            services,
            replies,
            locks: ExecutionLocks::new(),
            inter_reply_delay: Duration::from_millis(config.inter_reply_delay_ms),
        }
    }

    pub fn is_checking(&self, location_id: &str) -> bool {
        self.locks.is_held(location_id)
    }

    /// Runs one check for `location_id`. Overlapping checks for the same
    /// location are refused with `AlreadyRunning`.
    pub async fn run_cycle(&self, location_id: &str) -> Result<ReviewCycleOutcome, AutomationError> {
        let Some(_guard) = self.locks.try_acquire(location_id) else {
            return Err(AutomationError::AlreadyRunning(location_id.to_string()));
        };

        let result = self.cycle(location_id).await;
        let logged = match &result {
            Ok(outcome) if outcome.ran => {
                tracing::info!(
                    location_id,
                    fetched = outcome.fetched,
                    replied = outcome.replied,
                    failed = outcome.failed,
                    "review check finished"
                );
                self.services
                    .activity
                    .record_success(location_id, ActivityAction::ReviewCheck, json!(outcome))
                    .await
            }
            Ok(_) | Err(AutomationError::LocationNotFound(_)) => Ok(()),
            Err(error) => {
                if error.is_skip() {
                    tracing::info!(location_id, code = error.code(), "review check skipped");
                } else {
                    tracing::warn!(location_id, code = error.code(), %error, "review check failed");
                }
                self.services
                    .activity
                    .record_error(location_id, ActivityAction::ReviewCheck, error, json!({}))
                    .await
            }
        };
        if let Err(error) = logged {
            tracing::error!(location_id, error = %error, "failed to write activity entry");
        }
        result
    }

    async fn cycle(&self, location_id: &str) -> Result<ReviewCycleOutcome, AutomationError> {
        let config = self
            .services
            .automations
            .get(location_id)
            .await?
            .ok_or_else(|| AutomationError::LocationNotFound(location_id.to_string()))?;
        if !config.reply_active() {
            return Ok(ReviewCycleOutcome::default());
        }

        let target = self.services.authorize(&config).await?;
        let checked_at = Utc::now();
        let fetched = self.services.delivery.fetch_reviews(&target).await;
        self.services
            .automations
            .record_review_check(location_id, checked_at)
            .await?;
        let fetched = fetched?;

        let already_replied = self.replies.replied_ids(location_id).await?;
        let pending: Vec<&Review> = fetched
            .reviews
            .iter()
            .filter(|review| !review.has_reply && !already_replied.contains(&review.review_id))
            .collect();

        let mut outcome = ReviewCycleOutcome {
            ran: true,
            fetched: fetched.reviews.len(),
            pending: pending.len(),
            protocol: Some(fetched.protocol),
            ..ReviewCycleOutcome::default()
        };

        for (index, review) in pending.into_iter().enumerate() {
            if index > 0 && !self.inter_reply_delay.is_zero() {
                tokio::time::sleep(self.inter_reply_delay).await;
            }
            match self.reply_once(&config, &target, review).await {
                Ok(()) => outcome.replied += 1,
                Err(error) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        location_id,
                        review_id = %review.review_id,
                        code = error.code(),
                        %error,
                        "review reply failed"
                    );
                    if let Err(log_error) = self
                        .services
                        .activity
                        .record_error(
                            location_id,
                            ActivityAction::ReviewReply,
                            &error,
                            json!({ "review_id": review.review_id }),
                        )
                        .await
                    {
                        tracing::error!(location_id, error = %log_error, "failed to write activity entry");
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn reply_once(
        &self,
        config: &AutomationConfig,
        target: &DeliveryTarget,
        review: &Review,
    ) -> Result<(), AutomationError> {
        let reply = self
            .services
            .content
            .generate_reply(review, &config.posting.business)
            .await?;
        let protocol = self
            .services
            .delivery
            .reply_to_review(target, &review.review_id, &reply.content)
            .await?;
        self.replies
            .record(&config.location_id, &review.review_id, Utc::now())
            .await?;
        self.services
            .activity
            .record_success(
                &config.location_id,
                ActivityAction::ReviewReply,
                json!({
                    "review_id": review.review_id,
                    "rating": review.rating,
                    "protocol": protocol,
                }),
            )
            .await?;
        Ok(())
    }
}

/// Owns one poller task per location with replies switched on.
pub struct ReviewMonitor {
    worker: Arc<ReviewWorker>,
    poll_interval: Duration,
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ReviewMonitor {
    pub fn new(worker: Arc<ReviewWorker>, config: &ReviewsConfig) -> Self {
        Self {
            worker,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Installs a fresh poller, replacing any existing one. Does nothing but
    /// stop the old poller when replies are off for `config`.
    pub fn start_monitoring(&self, config: &AutomationConfig) -> bool {
        self.stop_monitoring(&config.location_id);
        if !config.reply_active() {
            return false;
        }

        let handle = tokio::spawn(run_poller(
            config.location_id.clone(),
            Arc::clone(&self.worker),
            self.poll_interval,
        ));
        match self.pollers.lock() {
            Ok(mut pollers) => {
                if let Some(previous) = pollers.insert(config.location_id.clone(), handle) {
                    previous.abort();
                }
                tracing::debug!(location_id = %config.location_id, "review poller started");
                true
            }
            Err(_) => {
                handle.abort();
                tracing::error!(location_id = %config.location_id, "poller registry poisoned");
                false
            }
        }
    }

    pub fn stop_monitoring(&self, location_id: &str) -> bool {
        let removed = self
            .pollers
            .lock()
            .ok()
            .and_then(|mut pollers| pollers.remove(location_id));
        match removed {
            Some(handle) => {
                handle.abort();
                tracing::debug!(location_id, "review poller stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, location_id: &str) -> bool {
        self.pollers.lock().is_ok_and(|pollers| {
            pollers
                .get(location_id)
                .is_some_and(|handle| !handle.is_finished())
        })
    }

    pub fn active_count(&self) -> usize {
        self.pollers.lock().map_or(0, |pollers| {
            pollers.values().filter(|handle| !handle.is_finished()).count()
        })
    }

    /// Starts pollers that should run and are not running; stops the rest.
    pub fn sync_all(&self, configs: &[AutomationConfig]) {
        let running: Vec<String> = self.pollers.lock().map_or_else(
            |_| Vec::new(),
            |pollers| pollers.keys().cloned().collect(),
        );
        for location_id in running {
            let keep = configs
                .iter()
                .any(|c| c.location_id == location_id && c.reply_active());
            if !keep {
                self.stop_monitoring(&location_id);
            }
        }
        for config in configs.iter().filter(|c| c.reply_active()) {
            if !self.is_active(&config.location_id) {
                self.start_monitoring(config);
            }
        }
    }

    pub async fn check_now(&self, location_id: &str) -> Result<ReviewCycleOutcome, AutomationError> {
        self.worker.run_cycle(location_id).await
    }

    pub fn is_checking(&self, location_id: &str) -> bool {
        self.worker.is_checking(location_id)
    }

    pub fn shutdown(&self) {
        if let Ok(mut pollers) = self.pollers.lock() {
            for (_, handle) in pollers.drain() {
                handle.abort();
            }
        }
    }
}

impl Drop for ReviewMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_poller(location_id: String, worker: Arc<ReviewWorker>, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // A cycle runs on its own task so stopping the poller never cuts a
        // reply off between delivery and its record.
        let cycle_worker = Arc::clone(&worker);
        let cycle_location = location_id.clone();
        let cycle = tokio::spawn(async move { cycle_worker.run_cycle(&cycle_location).await });
        match cycle.await {
            Ok(Ok(outcome)) if !outcome.ran => {
                tracing::debug!(%location_id, "replies switched off, poller exiting");
                return;
            }
            Ok(Err(AutomationError::LocationNotFound(_))) => {
                tracing::debug!(%location_id, "location removed, poller exiting");
                return;
            }
            Ok(_) => {}
            Err(error) => tracing::error!(%location_id, %error, "review check panicked"),
        }
    }
}
