use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Deserialize;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{PRICE_HTTP_TIMEOUT, SUPPORTED_CURRENCY_SYMBOLS};
use crate::error::{AppError, Result};
use crate::state::ExplorerStore;
use crate::types::lenient;

/// Quote currency every spot price is expressed in.
const QUOTE: &str = "USDT";

#[derive(Debug, Deserialize)]
struct AvgPrice {
    #[serde(deserialize_with = "lenient::f64")]
    price: f64,
}

/// Spot prices against USDT from the market data API.
#[derive(Debug, Clone)]
pub struct PriceFeed {
    http: reqwest::Client,
    base_url: String,
}

impl PriceFeed {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(PRICE_HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub async fn spot(&self, symbol: &str) -> Result<f64> {
        let symbol = symbol.to_ascii_uppercase();
        if symbol == QUOTE {
            return Ok(1.0);
        }
        let url = format!("{}/api/v3/avgPrice", self.base_url);
        let avg: AvgPrice = self
            .http
            .get(&url)
            .query(&[("symbol", format!("{symbol}{QUOTE}"))])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if avg.price > 0.0 {
            Ok(avg.price)
        } else {
            Err(AppError::NotFound(format!("no price for {symbol}")))
        }
    }
}

/// Refreshes every supported currency on a fixed interval. No retry budget:
/// a failed symbol keeps its previous price until the next round.
pub struct PriceWatcher {
    feed: PriceFeed,
    store: Arc<ExplorerStore>,
    symbols: Vec<String>,
    refresh: Duration,
}

impl PriceWatcher {
    pub fn new(feed: PriceFeed, store: Arc<ExplorerStore>, refresh: Duration) -> Self {
        Self {
            feed,
            store,
            symbols: SUPPORTED_CURRENCY_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            refresh,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.refresh);
        loop {
            ticker.tick().await;
            let updated = self.refresh_once().await;
            info!(updated, total = self.symbols.len(), "Price refresh complete");
        }
    }

    /// One concurrent round over all symbols. Returns how many prices were updated.
    pub async fn refresh_once(&self) -> usize {
        let quotes = join_all(self.symbols.iter().map(|s| self.feed.spot(s))).await;

        let mut updated = 0;
        for (symbol, quote) in self.symbols.iter().zip(quotes) {
            match quote {
                Ok(price) => {
                    self.store.set_price(symbol, price);
                    updated += 1;
                }
                Err(e) => warn!(symbol = %symbol, "Price fetch failed: {e}"),
            }
        }
        updated
    }
}
