//! Per-principal OAuth credentials: storage, proactive refresh and the
//! opt-in shared pool.

mod cache;
mod oauth;
mod repository;
mod types;

pub use oauth::{OAuthRefresher, RefreshError, TokenRefresher};
pub use types::{Credential, TokenGrant};

use crate::config::CredentialsConfig;
use crate::security::SecretStore;
use crate::storage::Store;
use anyhow::Result;
use cache::CredentialCache;
use chrono::{Duration, Utc};
use repository::CredentialRepository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub struct CredentialStore {
    repo: CredentialRepository,
    refresher: Arc<dyn TokenRefresher>,
    cache: CredentialCache,
    refresh_buffer: Duration,
    refresh_timeout: std::time::Duration,
    allow_pool_fallback: bool,
    // One lock per principal so a rotated refresh token is never used twice.
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialStore {
    pub fn new(
        store: &Store,
        secrets: SecretStore,
        refresher: Arc<dyn TokenRefresher>,
        config: &CredentialsConfig,
    ) -> Self {
        Self {
            repo: CredentialRepository::new(store, secrets),
            refresher,
            cache: CredentialCache::new(std::time::Duration::from_secs(config.cache_ttl_secs)),
            refresh_buffer: Duration::minutes(config.refresh_buffer_minutes.max(0)),
            refresh_timeout: std::time::Duration::from_secs(config.timeout_secs.max(1)),
            allow_pool_fallback: config.allow_pool_fallback,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The stored credential as-is, valid or not, never refreshed.
    pub async fn get(&self, principal_id: &str) -> Result<Option<Credential>> {
        self.repo.get(principal_id).await
    }

    pub async fn save(&self, credential: &Credential) -> Result<()> {
        self.cache.evict(&credential.principal_id);
        self.repo.save(credential).await
    }

    /// Marks the credential unusable until the principal reauthorizes.
    pub async fn invalidate(&self, principal_id: &str, reason: &str) -> Result<bool> {
        self.cache.evict(principal_id);
        let changed = self.repo.invalidate(principal_id, reason).await?;
        if changed {
            tracing::warn!(principal_id, reason, "credential invalidated");
        }
        Ok(changed)
    }

    /// Deletes the credential outright.
    pub async fn disconnect(&self, principal_id: &str) -> Result<bool> {
        self.cache.evict(principal_id);
        let removed = self.repo.delete(principal_id).await?;
        if removed {
            tracing::info!(principal_id, "credential disconnected");
        }
        Ok(removed)
    }

    /// A usable credential for `principal_id`, refreshed first when it is
    /// within the refresh buffer of expiry. `None` means reauthorization is
    /// needed or the token expired during a provider outage.
    pub async fn get_valid(&self, principal_id: &str) -> Result<Option<Credential>> {
        let now = Utc::now();
        if let Some(cached) = self.cache.get(principal_id)
            && !cached.expires_within(self.refresh_buffer, now)
        {
            return Ok(Some(cached));
        }

        let Some(credential) = self.repo.get(principal_id).await? else {
            return Ok(None);
        };
        if !credential.is_valid {
            return Ok(None);
        }
        if !credential.expires_within(self.refresh_buffer, now) {
            self.cache.put(&credential);
            return Ok(Some(credential));
        }

        self.refresh(credential).await
    }

    /// Like [`Self::get_valid`], but may borrow another principal's
    /// credential when pool fallback is enabled in configuration.
    pub async fn get_any_valid(&self, principal_id: &str) -> Result<Option<Credential>> {
        if let Some(own) = self.get_valid(principal_id).await? {
            return Ok(Some(own));
        }
        if !self.allow_pool_fallback {
            return Ok(None);
        }

        for candidate in self.repo.valid_principals_except(principal_id).await? {
            if let Some(pooled) = self.get_valid(&candidate).await? {
                tracing::warn!(
                    principal_id,
                    pooled_principal = %candidate,
                    "using pooled credential from another principal"
                );
                return Ok(Some(pooled));
            }
        }
        Ok(None)
    }

    fn refresh_lock(&self, principal_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(principal_id.to_string()).or_default())
    }

    async fn refresh(&self, stale: Credential) -> Result<Option<Credential>> {
        let lock = self.refresh_lock(&stale.principal_id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let Some(mut credential) = self.repo.get(&stale.principal_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        if !credential.is_valid {
            return Ok(None);
        }
        if !credential.expires_within(self.refresh_buffer, now) {
            self.cache.put(&credential);
            return Ok(Some(credential));
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            tracing::warn!(
                principal_id = %credential.principal_id,
                "credential near expiry has no refresh token"
            );
            return Ok((!credential.is_expired(now)).then_some(credential));
        };

        let outcome = tokio::time::timeout(self.refresh_timeout, self.refresher.refresh(&refresh_token))
            .await
            .unwrap_or_else(|_| {
                Err(RefreshError::Transient(format!(
                    "token refresh timed out after {}s",
                    self.refresh_timeout.as_secs()
                )))
            });

        match outcome {
            Ok(grant) => {
                credential.apply_grant(grant, Utc::now());
                self.repo.save(&credential).await?;
                self.cache.put(&credential);
                tracing::info!(
                    principal_id = %credential.principal_id,
                    expires_at = %credential.expires_at,
                    "credential refreshed"
                );
                Ok(Some(credential))
            }
            Err(RefreshError::Rejected(reason)) => {
                self.invalidate(&credential.principal_id, &reason).await?;
                Ok(None)
            }
            Err(RefreshError::Transient(reason)) => {
                tracing::warn!(
                    principal_id = %credential.principal_id,
                    %reason,
                    "credential refresh failed; keeping current token"
                );
                Ok((!credential.is_expired(Utc::now())).then_some(credential))
            }
        }
    }
}
