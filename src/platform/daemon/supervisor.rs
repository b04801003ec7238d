use crate::config::{Config, ReliabilityConfig};
use crate::diagnostics::health;
use crate::engine::Engine;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

// A run this long counts as healthy and resets the restart budget.
const HEALTHY_RUN: Duration = Duration::from_secs(300);

pub(super) fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    reliability: &ReliabilityConfig,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let initial_backoff = reliability.component_initial_backoff_secs.max(1);
    let max_backoff = reliability.component_max_backoff_secs.max(initial_backoff);
    let max_restarts = reliability.component_max_restarts;

    tokio::spawn(async move {
        let mut backoff = initial_backoff;
        let mut consecutive_failures: u32 = 0;

        loop {
            tracing::info!(component = name, "daemon component starting");
            health::mark_component_starting(name);
            let started = Instant::now();
            let outcome = run_component().await;
            if started.elapsed() >= HEALTHY_RUN {
                consecutive_failures = 0;
                backoff = initial_backoff;
            }
            match outcome {
                Ok(()) => {
                    tracing::warn!(component = name, "daemon component exited unexpectedly");
                    health::mark_component_error(name, "exited unexpectedly");
                    backoff = initial_backoff;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
                Err(error) => {
                    tracing::error!(component = name, error = %format!("{error:#}"), "daemon component failed");
                    health::mark_component_error(name, format!("{error:#}"));
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }

            if max_restarts > 0 && consecutive_failures > max_restarts {
                tracing::error!(
                    component = name,
                    max_restarts,
                    "daemon component exceeded max restarts, circuit open"
                );
                health::mark_component_stopped(name);
                break;
            }
            health::bump_component_restart(name);
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

/// Runs `cycle` every `period`, first after one full period. A failed
/// cycle is logged and marked in health; the next tick runs regardless.
async fn run_periodic<F, Fut>(name: &'static str, period: Duration, mut cycle: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    health::mark_component_ok(name);
    loop {
        ticker.tick().await;
        let started = Instant::now();
        match cycle().await {
            Ok(()) => health::record_cycle(name, started.elapsed()),
            Err(error) => {
                tracing::warn!(component = name, error = %format!("{error:#}"), "periodic cycle failed");
                health::mark_component_error(name, format!("{error:#}"));
            }
        }
    }
}

pub(super) fn spawn_supervised_components(
    config: &Config,
    engine: &Arc<Engine>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    let sync_period = Duration::from_secs(config.scheduler.sync_interval_secs.max(1));
    let scheduler_engine = Arc::clone(engine);
    handles.push(spawn_component_supervisor(
        health::SCHEDULER,
        &config.reliability,
        move || {
            let engine = Arc::clone(&scheduler_engine);
            async move {
                run_periodic(health::SCHEDULER, sync_period, move || {
                    let engine = Arc::clone(&engine);
                    async move {
                        let synced = engine.sync().await?;
                        tracing::debug!(
                            locations = synced,
                            timers = engine.active_timers(),
                            pollers = engine.active_pollers(),
                            "timers and pollers synced"
                        );
                        Ok(())
                    }
                })
                .await
            }
        },
    ));

    let recovery_period = Duration::from_secs(config.recovery.interval_secs.max(1));
    let recovery_engine = Arc::clone(engine);
    handles.push(spawn_component_supervisor(
        health::RECOVERY,
        &config.reliability,
        move || {
            let engine = Arc::clone(&recovery_engine);
            async move {
                run_periodic(health::RECOVERY, recovery_period, move || {
                    let engine = Arc::clone(&engine);
                    async move {
                        engine.reconcile().await?;
                        Ok(())
                    }
                })
                .await
            }
        },
    ));

    handles
}
