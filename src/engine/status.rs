use crate::automation::{AutomationConfig, DisableReason};
use crate::recovery::ActivityEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of one location, for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationStatus {
    pub location_id: String,
    pub principal_id: String,
    pub enabled: bool,
    pub posting_enabled: bool,
    pub reply_enabled: bool,
    pub frequency: Option<&'static str>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub timer_active: bool,
    pub poller_active: bool,
    pub executing: bool,
    pub disabled_reason: Option<DisableReason>,
    pub recent_activity: Vec<ActivityEntry>,
}

impl LocationStatus {
    pub(super) fn new(config: &AutomationConfig, next_due_at: Option<DateTime<Utc>>) -> Self {
        Self {
            location_id: config.location_id.clone(),
            principal_id: config.principal_id.clone(),
            enabled: config.enabled,
            posting_enabled: config.posting.enabled,
            reply_enabled: config.reply.enabled,
            frequency: config
                .posting
                .schedule
                .as_ref()
                .map(|policy| policy.frequency.as_label()),
            next_due_at,
            last_run_at: config.posting.last_run_at,
            last_check_at: config.reply.last_check_at,
            timer_active: false,
            poller_active: false,
            executing: false,
            disabled_reason: config.disabled.as_ref().map(|d| d.reason),
            recent_activity: Vec::new(),
        }
    }
}
