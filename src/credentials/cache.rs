use super::types::Credential;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Short-lived in-memory copies of valid credentials.
pub(super) struct CredentialCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Credential)>>,
}

impl CredentialCache {
    pub(super) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(super) fn get(&self, principal_id: &str) -> Option<Credential> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(principal_id) {
            Some((stored_at, credential)) if stored_at.elapsed() < self.ttl => {
                Some(credential.clone())
            }
            Some(_) => {
                entries.remove(principal_id);
                None
            }
            None => None,
        }
    }

    pub(super) fn put(&self, credential: &Credential) {
        if self.ttl.is_zero() || !credential.is_valid {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                credential.principal_id.clone(),
                (Instant::now(), credential.clone()),
            );
        }
    }

    pub(super) fn evict(&self, principal_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(principal_id);
        }
    }
}
