use crate::config::Config;
use crate::diagnostics::health;
use crate::engine::Engine;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

mod state;
mod supervisor;

pub use state::DaemonState;
use state::spawn_state_writer;
use supervisor::spawn_supervised_components;

const STATUS_FLUSH_SECONDS: u64 = 5;

/// Runs the engine with its periodic components until Ctrl-C.
pub async fn run(config: Arc<Config>) -> Result<()> {
    health::mark_component_starting(health::DAEMON);

    let engine = Arc::new(Engine::open(&config).await?);
    let report = engine.start().await?;
    tracing::info!(
        caught_up = report.executed.len(),
        failed = report.failed.len(),
        "startup reconciliation finished"
    );
    health::mark_component_ok(health::DAEMON);

    let mut handles: Vec<JoinHandle<()>> =
        vec![spawn_state_writer(&config, Arc::clone(&engine))];
    handles.extend(spawn_supervised_components(&config, &engine));

    println!("◆ locopilot daemon started");
    println!(
        "   timers: {}  review pollers: {}",
        engine.active_timers(),
        engine.active_pollers()
    );
    println!("   state file: {}", state_file_path(&config).display());
    println!("   press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    health::mark_component_stopped(health::DAEMON);

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }
    engine.shutdown();

    Ok(())
}

pub fn state_file_path(config: &Config) -> PathBuf {
    state::state_file_path(config)
}

pub async fn read_state(config: &Config) -> Result<Option<DaemonState>> {
    state::read_state(&state_file_path(config)).await
}
