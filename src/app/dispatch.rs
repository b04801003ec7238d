use crate::app::status::render_status;
use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result};
use locopilot::Config;
use locopilot::automation::{BusinessMetadata, ConfigUpdate};
use locopilot::engine::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn show_status(config: &Config, location: Option<String>, json: bool) -> Result<()> {
    let engine = Engine::open(config).await?;
    let statuses = match location {
        Some(location_id) => vec![engine.get_status(&location_id).await?],
        None => engine.get_all_statuses().await?,
    };
    let daemon = locopilot::platform::daemon::read_state(config)
        .await
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "daemon state file unreadable");
            None
        });

    if json {
        return print_json(&serde_json::json!({
            "daemon": daemon,
            "locations": statuses,
        }));
    }
    println!("{}", render_status(&statuses, daemon.as_ref()));
    Ok(())
}

/// One-shot commands open their own engine and never start timers; a running
/// daemon picks up stored changes on its next sync.
pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let config = Arc::new(config);

    match cli.command {
        Commands::Daemon => {
            info!("Starting locopilot daemon");
            locopilot::platform::daemon::run(Arc::clone(&config)).await
        }

        Commands::Status { location, json } => show_status(&config, location, json).await,

        Commands::Configure { location, file } => {
            let update: ConfigUpdate = read_json(&file).await?;
            let engine = Engine::open(&config).await?;
            let stored = engine.update_config(&location, update).await?;
            engine.shutdown();
            print_json(&stored)
        }

        Commands::PostNow { location, business } => {
            let business_override = match business {
                Some(path) => Some(read_json::<BusinessMetadata>(&path).await?),
                None => None,
            };
            let engine = Engine::open(&config).await?;
            let outcome = engine.trigger_post_now(&location, business_override).await?;
            print_json(&outcome)
        }

        Commands::CheckReviews { location } => {
            let engine = Engine::open(&config).await?;
            let outcome = engine.trigger_review_check_now(&location).await?;
            print_json(&outcome)
        }

        Commands::Disable { location } => {
            let engine = Engine::open(&config).await?;
            engine.disable_location(&location).await?;
            println!("✓ {location} disabled");
            Ok(())
        }

        Commands::Reconcile => {
            let engine = Engine::open(&config).await?;
            let report = engine.reconcile().await?;
            print_json(&report)
        }
    }
}
