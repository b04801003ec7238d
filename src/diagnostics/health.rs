//! Process-wide health of the daemon's long-running components.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

pub const DAEMON: &str = "daemon";
pub const SCHEDULER: &str = "scheduler";
pub const RECOVERY: &str = "recovery";
pub const STATE_WRITER: &str = "state_writer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentStatus {
    Starting,
    Ok,
    Error,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub updated_at: String,
    pub last_ok: Option<String>,
    pub last_error: Option<String>,
    pub restart_count: u64,
    /// Wall time of the most recent completed cycle.
    pub last_cycle_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub pid: u32,
    pub updated_at: String,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.components
            .values()
            .all(|c| c.status != ComponentStatus::Error)
    }
}

struct HealthRegistry {
    started_at: Instant,
    components: RwLock<BTreeMap<String, ComponentHealth>>,
}

static REGISTRY: OnceLock<HealthRegistry> = OnceLock::new();

fn registry() -> &'static HealthRegistry {
    REGISTRY.get_or_init(|| HealthRegistry {
        started_at: Instant::now(),
        components: RwLock::new(BTreeMap::new()),
    })
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn upsert_component<F>(component: &str, update: F)
where
    F: FnOnce(&mut ComponentHealth),
{
    if let Ok(mut map) = registry().components.write() {
        let now = now_rfc3339();
        let entry = map
            .entry(component.to_string())
            .or_insert_with(|| ComponentHealth {
                status: ComponentStatus::Starting,
                updated_at: now.clone(),
                last_ok: None,
                last_error: None,
                restart_count: 0,
                last_cycle_ms: None,
            });
        update(entry);
        entry.updated_at = now;
    }
}

pub fn mark_component_starting(component: &str) {
    upsert_component(component, |entry| {
        entry.status = ComponentStatus::Starting;
    });
}

pub fn mark_component_ok(component: &str) {
    upsert_component(component, |entry| {
        entry.status = ComponentStatus::Ok;
        entry.last_ok = Some(now_rfc3339());
        entry.last_error = None;
    });
}

/// Marks a finished cycle as healthy and remembers how long it took.
pub fn record_cycle(component: &str, elapsed: Duration) {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    upsert_component(component, |entry| {
        entry.status = ComponentStatus::Ok;
        entry.last_ok = Some(now_rfc3339());
        entry.last_error = None;
        entry.last_cycle_ms = Some(millis);
    });
}

#[allow(clippy::needless_pass_by_value)]
pub fn mark_component_error(component: &str, error: impl ToString) {
    let err = error.to_string();
    upsert_component(component, move |entry| {
        entry.status = ComponentStatus::Error;
        entry.last_error = Some(err);
    });
}

pub fn mark_component_stopped(component: &str) {
    upsert_component(component, |entry| {
        entry.status = ComponentStatus::Stopped;
    });
}

pub fn bump_component_restart(component: &str) {
    upsert_component(component, |entry| {
        entry.restart_count = entry.restart_count.saturating_add(1);
    });
}

pub fn component(component: &str) -> Option<ComponentHealth> {
    registry()
        .components
        .read()
        .ok()
        .and_then(|map| map.get(component).cloned())
}

pub fn snapshot() -> HealthSnapshot {
    let components = registry()
        .components
        .read()
        .map_or_else(|_| BTreeMap::new(), |map| map.clone());

    HealthSnapshot {
        pid: std::process::id(),
        updated_at: now_rfc3339(),
        uptime_seconds: registry().started_at.elapsed().as_secs(),
        components,
    }
}

pub fn snapshot_json() -> serde_json::Value {
    serde_json::to_value(snapshot()).unwrap_or_else(|_| {
        serde_json::json!({
            "status": "error",
            "message": "failed to serialize health snapshot"
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn unique_component(prefix: &str) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{id}")
    }

    #[test]
    fn new_components_start_in_starting_state() {
        let name = unique_component("health-start");
        mark_component_starting(&name);
        let state = component(&name).unwrap();
        assert_eq!(state.status, ComponentStatus::Starting);
        assert_eq!(state.restart_count, 0);
    }

    #[test]
    fn error_keeps_last_ok_and_clears_on_recovery() {
        let name = unique_component("health-error");
        mark_component_ok(&name);
        mark_component_error(&name, "store unavailable");

        let state = component(&name).unwrap();
        assert_eq!(state.status, ComponentStatus::Error);
        assert_eq!(state.last_error.as_deref(), Some("store unavailable"));
        assert!(state.last_ok.is_some());

        record_cycle(&name, Duration::from_millis(42));
        let state = component(&name).unwrap();
        assert_eq!(state.status, ComponentStatus::Ok);
        assert_eq!(state.last_error, None);
        assert_eq!(state.last_cycle_ms, Some(42));
    }

    #[test]
    fn restarts_are_counted() {
        let name = unique_component("health-restart");
        bump_component_restart(&name);
        bump_component_restart(&name);
        assert_eq!(component(&name).unwrap().restart_count, 2);
    }

    #[test]
    fn snapshot_json_uses_snake_case_status() {
        let name = unique_component("health-json");
        mark_component_stopped(&name);

        let json = snapshot_json();
        let status = json
            .get("components")
            .and_then(|components| components.get(&name))
            .and_then(|entry| entry.get("status"))
            .and_then(serde_json::Value::as_str);
        assert_eq!(status, Some("stopped"));
    }
}
