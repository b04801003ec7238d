//! Per-location posting timers.
//!
//! Each scheduled location owns exactly one tokio task. The task reloads the
//! location's run history, sleeps until the next slot, then hands the slot to
//! a [`DueHandler`] on a separate task so that cancelling the timer never
//! interrupts a post that has already started.

mod policy;

pub use policy::compute_next_due;

use crate::automation::{AutomationConfig, AutomationRepository, SchedulePolicy};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;

const STORE_RETRY_SECONDS: u64 = 30;

/// Receives due slots from the timers.
pub trait DueHandler: Send + Sync + 'static {
    fn run_due<'a>(&'a self, location_id: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

struct Timer {
    policy: SchedulePolicy,
    handle: JoinHandle<()>,
}

pub struct ScheduleManager {
    repo: AutomationRepository,
    handler: Arc<dyn DueHandler>,
    timers: Mutex<HashMap<String, Timer>>,
}

impl ScheduleManager {
    pub fn new(repo: AutomationRepository, handler: Arc<dyn DueHandler>) -> Self {
        Self {
            repo,
            handler,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Installs a timer for `location_id`, replacing any existing one.
    pub fn schedule(&self, location_id: &str, policy: SchedulePolicy) {
        let handle = tokio::spawn(run_timer(
            location_id.to_string(),
            policy.clone(),
            self.repo.clone(),
            Arc::clone(&self.handler),
        ));

        let Ok(mut timers) = self.timers.lock() else {
            handle.abort();
            tracing::error!(location_id, "timer registry poisoned");
            return;
        };
        if let Some(previous) = timers.insert(location_id.to_string(), Timer { policy, handle }) {
            previous.handle.abort();
        }
        tracing::debug!(location_id, "posting timer scheduled");
    }

    /// Removes the timer. Returns whether one was installed.
    pub fn cancel(&self, location_id: &str) -> bool {
        let removed = self
            .timers
            .lock()
            .ok()
            .and_then(|mut timers| timers.remove(location_id));
        match removed {
            Some(timer) => {
                timer.handle.abort();
                tracing::debug!(location_id, "posting timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, location_id: &str) -> bool {
        self.timers.lock().is_ok_and(|timers| {
            timers
                .get(location_id)
                .is_some_and(|timer| !timer.handle.is_finished())
        })
    }

    pub fn active_count(&self) -> usize {
        self.timers.lock().map_or(0, |timers| {
            timers
                .values()
                .filter(|timer| !timer.handle.is_finished())
                .count()
        })
    }

    /// Brings the timer for one location in line with its configuration.
    /// An unchanged, still-running timer is left alone.
    pub fn sync(&self, config: &AutomationConfig) {
        let wanted = config
            .posting
            .schedule
            .as_ref()
            .filter(|_| config.posting_active());

        let Some(policy) = wanted else {
            self.cancel(&config.location_id);
            return;
        };

        let unchanged = self.timers.lock().is_ok_and(|timers| {
            timers.get(&config.location_id).is_some_and(|timer| {
                timer.policy == *policy && !timer.handle.is_finished()
            })
        });
        if !unchanged {
            self.schedule(&config.location_id, policy.clone());
        }
    }

    /// Cancels timers for locations absent from `configs`, then syncs the rest.
    pub fn sync_all(&self, configs: &[AutomationConfig]) {
        let stale: Vec<String> = self.timers.lock().map_or_else(
            |_| Vec::new(),
            |timers| {
                timers
                    .keys()
                    .filter(|id| !configs.iter().any(|c| &c.location_id == *id))
                    .cloned()
                    .collect()
            },
        );
        for location_id in stale {
            self.cancel(&location_id);
        }
        for config in configs {
            self.sync(config);
        }
    }

    pub fn shutdown(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            for (_, timer) in timers.drain() {
                timer.handle.abort();
            }
        }
    }
}

impl Drop for ScheduleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_timer(
    location_id: String,
    policy: SchedulePolicy,
    repo: AutomationRepository,
    handler: Arc<dyn DueHandler>,
) {
    // Slots already handed to the handler. A failed post leaves `last_run_at`
    // untouched, so without this the timer would refire the same slot.
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        let last_run_at = match repo.get(&location_id).await {
            Ok(Some(config)) if config.posting_active() => config.posting.last_run_at,
            Ok(_) => {
                tracing::debug!(%location_id, "posting no longer active, timer exiting");
                return;
            }
            Err(error) => {
                tracing::warn!(%location_id, %error, "failed to load run history");
                tokio::time::sleep(Duration::from_secs(STORE_RETRY_SECONDS)).await;
                continue;
            }
        };

        let anchor = match (last_run_at, last_fired) {
            (Some(run), Some(fired)) => Some(run.max(fired)),
            (run, fired) => run.or(fired),
        };
        let now = Utc::now();
        let due = compute_next_due(&policy, anchor, now);
        let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(%location_id, due = %due, "next posting slot");

        tokio::time::sleep(wait).await;
        last_fired = Some(due.max(now));

        let run_handler = Arc::clone(&handler);
        let run_location = location_id.clone();
        let execution = tokio::spawn(async move { run_handler.run_due(&run_location).await });
        if let Err(error) = execution.await {
            tracing::error!(%location_id, %error, "posting task panicked");
        }
    }
}
