use crate::automation::DisableReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Billing state as stored for a principal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Canceled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub principal_id: String,
    pub status: SubscriptionStatus,
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The derived answer to "may this principal act now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntitlementStatus {
    Trial,
    Active,
    Expired,
    Admin,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DenialReason {
    TrialExpired,
    SubscriptionExpired,
    NoEntitlement,
}

impl DenialReason {
    /// Only lapsed windows switch automation off; a principal that never had
    /// an entitlement is simply refused.
    pub fn disables_configs(self) -> bool {
        matches!(self, Self::TrialExpired | Self::SubscriptionExpired)
    }
}

impl From<DenialReason> for DisableReason {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::TrialExpired => Self::TrialExpired,
            DenialReason::SubscriptionExpired => Self::SubscriptionExpired,
            DenialReason::NoEntitlement => Self::NoEntitlement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub status: EntitlementStatus,
    /// `None` when access is unlimited or denied.
    pub days_remaining: Option<i64>,
    pub reason: Option<DenialReason>,
}

impl AccessDecision {
    pub fn admin() -> Self {
        Self {
            allowed: true,
            status: EntitlementStatus::Admin,
            days_remaining: None,
            reason: None,
        }
    }

    pub fn allowed(status: EntitlementStatus, days_remaining: Option<i64>) -> Self {
        Self {
            allowed: true,
            status,
            days_remaining,
            reason: None,
        }
    }

    pub fn denied(reason: DenialReason) -> Self {
        Self {
            allowed: false,
            status: EntitlementStatus::Expired,
            days_remaining: Some(0),
            reason: Some(reason),
        }
    }
}

/// A decision plus the configuration changes it caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enforcement {
    pub decision: AccessDecision,
    pub disabled: Vec<String>,
    pub reenabled: Vec<String>,
}
