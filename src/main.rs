//! fairbet server binary: config, storage, registry, HTTP API.

use clap::Parser;
use fairbet::api::{create_router, ApiState};
use fairbet::config::ConfigLoader;
use fairbet::games::registry::RoundRegistry;
use fairbet::ledger::MemoryLedger;
use fairbet::store::RocksRoundStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fairbet", about = "Provably-fair wagering engine server")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Override the configured API port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(port) = args.port {
        config.api.port = port;
    }

    let store = Arc::new(RocksRoundStore::open(&config.storage.data_dir)?);
    let ledger = Arc::new(MemoryLedger::new());
    let registry = Arc::new(RoundRegistry::new(
        config.game.clone(),
        ledger.clone(),
        store.clone(),
    ));

    // Re-drive any payout credits that did not complete before shutdown.
    match registry.retry_pending_settlements() {
        Ok(0) => {}
        Ok(settled) => tracing::info!("settled {settled} pending payouts from a previous run"),
        Err(e) => tracing::warn!("pending settlement sweep failed: {e}"),
    }

    let state = ApiState {
        registry,
        store,
        ledger,
        config: config.clone(),
    };
    let router = create_router(state);

    let addr = format!("{}:{}", config.api.listen_address, config.api.port);
    tracing::info!("fairbet listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
