use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Per-location exclusivity for in-flight work.
#[derive(Debug, Default)]
pub struct ExecutionLocks {
    held: Mutex<HashSet<String>>,
}

impl ExecutionLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `None` when another execution already holds `location_id`.
    pub fn try_acquire(self: &Arc<Self>, location_id: &str) -> Option<ExecutionGuard> {
        let mut held = self.held.lock().ok()?;
        if !held.insert(location_id.to_string()) {
            return None;
        }
        Some(ExecutionGuard {
            locks: Arc::clone(self),
            location_id: location_id.to_string(),
        })
    }

    pub fn is_held(&self, location_id: &str) -> bool {
        self.held
            .lock()
            .is_ok_and(|held| held.contains(location_id))
    }
}

/// Releases the location when dropped, on success, failure or panic alike.
#[derive(Debug)]
pub struct ExecutionGuard {
    locks: Arc<ExecutionLocks>,
    location_id: String,
}

impl ExecutionGuard {
    pub fn location_id(&self) -> &str {
        &self.location_id
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.held.lock() {
            held.remove(&self.location_id);
        }
    }
}
