//! Crashline engine process: wires the durable ledger, price oracle, round
//! engine and scheduler, then runs rounds until interrupted.

use clap::Parser;
use crashline::config::EngineConfig;
use crashline::engine::RoundEngine;
use crashline::events::{EventHub, GameEvent};
use crashline::ledger::LedgerStore;
use crashline::scheduler::RoundScheduler;
use crashline::storage::RocksLedger;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crashline", about = "Provably fair crash-game round engine")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger data directory (overrides the configured one)
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.storage.data_directory = data_dir;
    }
    config.validate()?;

    let ledger: Arc<dyn LedgerStore> =
        Arc::new(RocksLedger::open(Path::new(&config.storage.data_directory))?);
    let events = EventHub::default();
    let engine = RoundEngine::new(ledger.clone(), events.clone(), config.round.clone());
    let scheduler = RoundScheduler::new(
        engine,
        ledger.clone(),
        config.round.pause_between_rounds(),
    );

    // Log lifecycle events; a transport layer would subscribe the same way.
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(GameEvent::MultiplierUpdate { round_id, multiplier }) => {
                    tracing::debug!(round_id, multiplier, "multiplier");
                }
                Ok(event) => tracing::info!(?event, "event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down after current round");
    scheduler.stop();
    scheduler_task.await??;
    Ok(())
}
