mod api;
mod config;
mod error;
mod feeds;
mod fetcher;
mod pipeline;
mod poller;
mod price;
mod state;
mod types;
mod vault;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState, HealthState};
use crate::config::{supported_vault_symbols, Config};
use crate::error::Result;
use crate::feeds::Feeds;
use crate::fetcher::ExplorerClient;
use crate::price::{PriceFeed, PriceWatcher};
use crate::state::{ExplorerStore, ViewRegistry};
use crate::types::{OptionType, SUPPORTED_CHAINS};
use crate::vault::{RpcVaultReader, VaultWatcher};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        api_url = %cfg.api_url,
        poll_ms = cfg.poll_interval.as_millis() as u64,
        retries = cfg.poll_retries,
        max_live_views = cfg.max_live_views,
        "Starting explorer"
    );
    warn_missing_vaults(&cfg);

    let store = ExplorerStore::new();
    let health = Arc::new(HealthState::new());
    let client = ExplorerClient::new(&cfg)?;
    let feeds = Feeds::new(&cfg, client, Arc::clone(&store), Arc::clone(&health));
    let registry = Arc::new(ViewRegistry::new(
        cfg.max_live_views,
        Arc::clone(&store),
        Arc::clone(&health),
    ));

    // --- Background views: overview stats, recent feed, per-chain tops and vault activity ---
    let background = Feeds::background_keys();
    for key in &background {
        registry.pin(key.clone(), feeds.start(key.clone()));
    }
    info!("Pinned {} background views", background.len());

    // Spot prices (background, every PRICE_REFRESH_SECS)
    let prices = PriceWatcher::new(PriceFeed::new(cfg.price_api_url.clone())?, Arc::clone(&store), cfg.price_refresh);
    tokio::spawn(async move { prices.run().await });

    // Vault list (background, every VAULT_REFRESH_SECS)
    let vaults = VaultWatcher::new(
        cfg.vault_addresses.clone(),
        Arc::new(RpcVaultReader::new()?),
        Arc::clone(&store),
        cfg.vault_refresh,
    );
    tokio::spawn(async move { vaults.run().await });

    // HTTP API server
    let api_state = ApiState {
        store,
        registry,
        feeds,
        health,
        warmup: cfg.view_warmup,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Vault slots without a configured contract are listed with default figures.
fn warn_missing_vaults(cfg: &Config) {
    for chain in SUPPORTED_CHAINS {
        for &symbol in supported_vault_symbols(chain) {
            for option_type in [OptionType::Call, OptionType::Put] {
                if cfg.vault_address(chain, symbol, option_type).is_none() {
                    warn!(chain = %chain, symbol, option = %option_type, "No vault address configured");
                }
            }
        }
    }
}
