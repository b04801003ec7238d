use crate::config::Config;
use crate::diagnostics::health;
use crate::engine::Engine;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonState {
    #[serde(flatten)]
    pub snapshot: serde_json::Map<String, serde_json::Value>,
    pub active_timers: usize,
    pub active_pollers: usize,
    pub written_at: String,
}

pub(super) fn state_file_path(config: &Config) -> PathBuf {
    config
        .config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join("daemon_state.json")
}

/// Last state a running (or crashed) daemon flushed, if any.
pub(super) async fn read_state(path: &Path) -> anyhow::Result<Option<DaemonState>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn current_state(engine: &Engine) -> DaemonState {
    DaemonState {
        snapshot: health::snapshot_json()
            .as_object()
            .cloned()
            .unwrap_or_default(),
        active_timers: engine.active_timers(),
        active_pollers: engine.active_pollers(),
        written_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

pub(super) fn spawn_state_writer(config: &Config, engine: Arc<Engine>) -> JoinHandle<()> {
    let path = state_file_path(config);
    tokio::spawn(async move {
        if let Some(parent) = path.parent()
            && let Err(error) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!(%error, "failed to create state file directory");
        }

        let mut interval = tokio::time::interval(Duration::from_secs(super::STATUS_FLUSH_SECONDS));
        loop {
            interval.tick().await;
            let data = serde_json::to_vec_pretty(&current_state(&engine))
                .unwrap_or_else(|_| b"{}".to_vec());
            match tokio::fs::write(&path, data).await {
                Ok(()) => health::mark_component_ok(health::STATE_WRITER),
                Err(error) => {
                    tracing::warn!(%error, "failed to write daemon state file");
                    health::mark_component_error(health::STATE_WRITER, error);
                }
            }
        }
    })
}
