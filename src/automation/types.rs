use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// How often a location posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    #[serde(alias = "alternative")]
    EveryTwoDays,
    Weekly,
    /// Several daily slots; the policy's own `time` is ignored.
    Custom { slots: Vec<NaiveTime> },
    /// Fixed short period, only meant for validating an installation.
    TestInterval { secs: u64 },
}

impl Frequency {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::EveryTwoDays => "every_2_days",
            Self::Weekly => "weekly",
            Self::Custom { .. } => "custom",
            Self::TestInterval { .. } => "test_interval",
        }
    }
}

/// A fully resolved posting schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    pub frequency: Frequency,
    pub time: NaiveTime,
    pub timezone: Tz,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessMetadata {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Free-form "where we are" text, e.g. city and neighbourhood.
    #[serde(default, alias = "locationText")]
    pub location_text: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, alias = "websiteUrl")]
    pub website_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingConfig {
    pub enabled: bool,
    /// `None` means posting was switched on without a usable schedule.
    pub schedule: Option<SchedulePolicy>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub business: BusinessMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyConfig {
    pub enabled: bool,
    pub last_check_at: Option<DateTime<Utc>>,
}

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
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DisableReason {
    Manual,
    TrialExpired,
    SubscriptionExpired,
    NoEntitlement,
}

impl DisableReason {
    /// Entitlement disables are undone automatically on renewal; manual ones never are.
    pub fn is_entitlement(self) -> bool {
        !matches!(self, Self::Manual)
    }

    pub(crate) const ENTITLEMENT_REASONS: [Self; 3] = [
        Self::TrialExpired,
        Self::SubscriptionExpired,
        Self::NoEntitlement,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledState {
    pub reason: DisableReason,
    pub at: DateTime<Utc>,
}

/// Everything the engine knows about one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub location_id: String,
    pub principal_id: String,
    /// Needed only by the legacy delivery protocol.
    pub account_id: Option<String>,
    pub enabled: bool,
    pub posting: PostingConfig,
    pub reply: ReplyConfig,
    pub disabled: Option<DisabledState>,
}

impl AutomationConfig {
    pub fn posting_active(&self) -> bool {
        self.enabled && self.posting.enabled
    }

    pub fn reply_active(&self) -> bool {
        self.enabled && self.reply.enabled
    }
}
