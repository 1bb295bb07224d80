use anyhow::Context;
use offnormal::{AddressSpace, AlarmManager, ChannelSink, Config};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    offnormal::init()?;

    info!("Offnormal v{} starting", offnormal::VERSION);

    let config_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            error!("Usage: offnormal <config.yaml>");
            std::process::exit(1);
        }
    };

    let config = Config::from_file(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    info!("Loaded {} nodes, {} alarms", config.nodes.len(), config.alarms.len());

    let (sink, mut events) = ChannelSink::channel();
    let space = AddressSpace::new();
    let mut manager = AlarmManager::from_config(space, &config, Arc::new(sink))
        .context("building alarms")?;

    // Events raised during construction are already queued
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) if event.is_active => warn!("Condition event: {}", json),
                Ok(json) => info!("Condition event: {}", json),
                Err(e) => error!("Cannot render condition event: {}", e),
            }
        }
    });

    for alarm in manager.active_alarms() {
        warn!("Alarm '{}' active at startup", alarm.name());
    }

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("Received shutdown signal");

    for summary in manager.summaries() {
        info!(
            "Alarm '{}': active {}, {} evaluations, {} transitions, {} ignored deliveries",
            summary.name,
            summary.active,
            summary.stats.evaluations,
            summary.stats.transitions,
            summary.stats.ignored_deliveries
        );
    }

    manager.shutdown();
    // Dropping the manager releases the last sender so the reporter drains and exits
    drop(manager);
    if let Err(e) = reporter.await {
        error!("Event reporter failed: {}", e);
    }

    info!("Offnormal stopped normally");
    Ok(())
}
