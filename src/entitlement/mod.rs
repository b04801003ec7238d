//! Trial, subscription and admin access checks, with the side effect of
//! switching a lapsed principal's automation off and back on.

mod repository;
mod types;

pub use repository::SubscriptionRepository;
pub use types::{
    AccessDecision, DenialReason, Enforcement, EntitlementStatus, Subscription,
    SubscriptionStatus,
};

use crate::automation::AutomationRepository;
use crate::config::EntitlementConfig;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

const SECONDS_PER_DAY: i64 = 86_400;

pub struct EntitlementGuard {
    subscriptions: SubscriptionRepository,
    automations: AutomationRepository,
    admins: HashSet<String>,
    default_trial_days: i64,
}

impl EntitlementGuard {
    pub fn new(
        subscriptions: SubscriptionRepository,
        automations: AutomationRepository,
        config: &EntitlementConfig,
    ) -> Self {
        Self {
            subscriptions,
            automations,
            admins: config
                .admin_principals
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            default_trial_days: config.default_trial_days.max(0),
        }
    }

    pub async fn has_access(&self, principal_id: &str) -> Result<AccessDecision> {
        Ok(self.enforce(principal_id).await?.decision)
    }

    /// Decides access and applies the consequences: lapsed principals get
    /// their configurations disabled, renewed ones get entitlement disables
    /// undone. Manual disables are never touched.
    pub async fn enforce(&self, principal_id: &str) -> Result<Enforcement> {
        let now = Utc::now();
        let decision = if self.admins.contains(principal_id) {
            AccessDecision::admin()
        } else {
            let subscription = self.subscriptions.get(principal_id).await?;
            evaluate(subscription.as_ref(), self.default_trial_days, now)
        };

        let mut enforcement = Enforcement {
            decision,
            disabled: Vec::new(),
            reenabled: Vec::new(),
        };

        if enforcement.decision.allowed {
            enforcement.reenabled = self.automations.reenable_after_entitlement(principal_id).await?;
            if !enforcement.reenabled.is_empty() {
                tracing::info!(
                    principal_id,
                    locations = ?enforcement.reenabled,
                    "entitlement restored; automation re-enabled"
                );
            }
        } else if let Some(reason) = enforcement.decision.reason
            && reason.disables_configs()
        {
            enforcement.disabled = self
                .automations
                .disable_for_entitlement(principal_id, reason.into(), now)
                .await?;
            if !enforcement.disabled.is_empty() {
                tracing::warn!(
                    principal_id,
                    %reason,
                    locations = ?enforcement.disabled,
                    "entitlement lapsed; automation disabled"
                );
            }
        }

        Ok(enforcement)
    }
}

/// Pure access decision for a non-admin principal.
pub fn evaluate(
    subscription: Option<&Subscription>,
    default_trial_days: i64,
    now: DateTime<Utc>,
) -> AccessDecision {
    let Some(subscription) = subscription else {
        return AccessDecision::denied(DenialReason::NoEntitlement);
    };

    match subscription.status {
        SubscriptionStatus::Active => match subscription.period_end {
            None => AccessDecision::allowed(EntitlementStatus::Active, None),
            Some(end) if end > now => {
                AccessDecision::allowed(EntitlementStatus::Active, Some(days_until(end, now)))
            }
            Some(_) => AccessDecision::denied(DenialReason::SubscriptionExpired),
        },
        SubscriptionStatus::Trial => {
            let end = subscription
                .period_end
                .unwrap_or(subscription.created_at + Duration::days(default_trial_days));
            if end > now {
                AccessDecision::allowed(EntitlementStatus::Trial, Some(days_until(end, now)))
            } else {
                AccessDecision::denied(DenialReason::TrialExpired)
            }
        }
        SubscriptionStatus::PastDue | SubscriptionStatus::Canceled | SubscriptionStatus::Expired => {
            AccessDecision::denied(DenialReason::SubscriptionExpired)
        }
    }
}

/// Whole days left, rounded up so the final partial day still counts.
fn days_until(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (end - now).num_seconds().max(0);
    (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}
