use crate::automation::{AutomationConfig, AutomationRepository};
use crate::content::ContentGenerator;
use crate::credentials::CredentialStore;
use crate::delivery::{DeliveryTarget, DualProtocolDelivery};
use crate::entitlement::{DenialReason, EntitlementGuard};
use crate::error::AutomationError;
use crate::recovery::ActivityLog;
use std::sync::Arc;

/// The collaborators every posting and reply attempt goes through.
#[derive(Clone)]
pub struct Services {
    pub automations: AutomationRepository,
    pub entitlement: Arc<EntitlementGuard>,
    pub credentials: Arc<CredentialStore>,
    pub content: Arc<ContentGenerator>,
    pub delivery: Arc<DualProtocolDelivery>,
    pub activity: ActivityLog,
}

impl Services {
    /// Checks entitlement, then resolves a usable credential for the
    /// location's principal.
    pub async fn authorize(
        &self,
        config: &AutomationConfig,
    ) -> Result<DeliveryTarget, AutomationError> {
        let enforcement = self.entitlement.enforce(&config.principal_id).await?;
        if !enforcement.decision.allowed {
            return Err(AutomationError::EntitlementDenied {
                principal_id: config.principal_id.clone(),
                reason: enforcement
                    .decision
                    .reason
                    .unwrap_or(DenialReason::NoEntitlement),
            });
        }

        let credential = self
            .credentials
            .get_any_valid(&config.principal_id)
            .await?
            .ok_or_else(|| AutomationError::CredentialUnavailable {
                principal_id: config.principal_id.clone(),
            })?;

        Ok(DeliveryTarget {
            location_id: config.location_id.clone(),
            account_id: config.account_id.clone(),
            access_token: credential.access_token,
        })
    }
}
