//! Seed a ledger with demo players and balances for local development.

use clap::Parser;
use crashline::ledger::LedgerStore;
use crashline::round::Currency;
use crashline::storage::RocksLedger;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "seed_players", about = "Seed demo players into a crashline ledger")]
struct Args {
    /// Ledger data directory
    #[arg(long, default_value = "./DB/crashline")]
    data_dir: String,

    /// BTC credited to each demo player
    #[arg(long, default_value_t = 0.01)]
    btc: f64,

    /// ETH credited to each demo player
    #[arg(long, default_value_t = 1.0)]
    eth: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let ledger = RocksLedger::open(Path::new(&args.data_dir))?;

    for player_id in ["player1", "player2", "player3"] {
        ledger.create_player(player_id).await?;
        ledger.credit(player_id, Currency::Btc, args.btc).await?;
        ledger.credit(player_id, Currency::Eth, args.eth).await?;
        let player = ledger
            .get_player(player_id)
            .await?
            .expect("player just created");
        tracing::info!(
            player_id,
            btc = player.balance(Currency::Btc),
            eth = player.balance(Currency::Eth),
            "Seeded player"
        );
    }

    tracing::info!("Ledger seeded");
    Ok(())
}
