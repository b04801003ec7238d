use crate::entitlement::DenialReason;
use thiserror::Error;

// ─── Automation errors ──────────────────────────────────────────────────────

/// The outbound call that exceeded its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TimedOperation {
    CredentialRefresh,
    ContentGeneration,
    Delivery,
    ReviewFetch,
}

/// Every failure a single posting or reply attempt can end in.
///
/// Storage and adapter internals use `anyhow::Result` for context chains and
/// convert at the engine boundary. None of these escape a timer or poller
/// loop: the execution boundary turns them into an activity entry and the
/// loop carries on.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("location {location_id} has no posting schedule configured")]
    ConfigurationMissing { location_id: String },

    #[error("principal {principal_id} is not entitled: {reason}")]
    EntitlementDenied {
        principal_id: String,
        reason: DenialReason,
    },

    #[error("no usable credential for principal {principal_id}; reauthorization required")]
    CredentialUnavailable { principal_id: String },

    #[error("content generation failed: {0}")]
    ContentGenerationFailed(String),

    #[error("delivery failed on both protocols (primary: {primary}; legacy: {legacy})")]
    DeliveryFailed { primary: String, legacy: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: TimedOperation, secs: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("location {0} not found")]
    LocationNotFound(String),

    #[error("location {0} already has a post in flight")]
    AlreadyRunning(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl AutomationError {
    /// Stable identifier written to the activity log `status` column.
    ///
    /// Timeouts report the class of the call that timed out.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing { .. } => "configuration_missing",
            Self::EntitlementDenied { .. } => "entitlement_denied",
            Self::CredentialUnavailable { .. } => "credential_unavailable",
            Self::ContentGenerationFailed(_) => "content_generation_failed",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::Timeout { operation, .. } => match operation {
                TimedOperation::CredentialRefresh => "credential_unavailable",
                TimedOperation::ContentGeneration => "content_generation_failed",
                TimedOperation::Delivery | TimedOperation::ReviewFetch => "delivery_failed",
            },
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::LocationNotFound(_) => "location_not_found",
            Self::AlreadyRunning(_) => "already_running",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Skips are expected outcomes (nothing to do this cycle), not failures.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationMissing { .. }
                | Self::EntitlementDenied { .. }
                | Self::AlreadyRunning(_)
        )
    }
}

impl From<anyhow::Error> for AutomationError {
    fn from(error: anyhow::Error) -> Self {
        Self::Storage(format!("{error:#}"))
    }
}
