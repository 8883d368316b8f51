use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Datelike, Days, Timelike, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{supported_vault_symbols, VaultAddress, DEFAULT_VAULT_APY, DEFAULT_VAULT_CAP};
use crate::pipeline::numeric::{scale_units, trim_number_string};
use crate::state::ExplorerStore;
use crate::types::{ChainId, OptionType, SUPPORTED_CHAINS};
use crate::vault::reader::{VaultReader, VaultState};

/// A Defi Option Vault as listed on the vaults page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefiProduct {
    pub chain_id: i64,
    pub currency: String,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub apy: String,
    /// Milliseconds.
    pub expired_at: i64,
    pub invest_currency: String,
    pub strike_price: String,
    pub cap: f64,
    pub total_balance: f64,
    pub current_option: Option<String>,
    pub address: Option<String>,
}

/// Next Friday 08:00 UTC in milliseconds. On a Friday at or after 08:00, the Friday after.
pub fn next_expiry(now: DateTime<Utc>) -> i64 {
    let weekday = now.weekday().num_days_from_sunday();
    let displacement = (5 + 7 - weekday) % 7;
    let days = if displacement == 0 && now.hour() >= 8 {
        7
    } else {
        displacement
    };
    now.date_naive()
        .checked_add_days(Days::new(u64::from(days)))
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .map_or(0, |dt| dt.and_utc().timestamp_millis())
}

/// One CALL and one PUT vault per supported (chain, symbol), enriched with
/// whatever on-chain state could be read. Unreadable vaults keep defaults.
pub async fn build_vault_list(
    addresses: &[VaultAddress],
    reader: &dyn VaultReader,
    now: DateTime<Utc>,
) -> Vec<DefiProduct> {
    let expired_at = next_expiry(now);

    let slots: Vec<(ChainId, &str, OptionType)> = SUPPORTED_CHAINS
        .iter()
        .flat_map(|&chain| {
            supported_vault_symbols(chain).iter().flat_map(move |&symbol| {
                [OptionType::Call, OptionType::Put].map(|option_type| (chain, symbol, option_type))
            })
        })
        .collect();

    let products = slots.into_iter().map(|(chain, symbol, option_type)| {
        let address = addresses
            .iter()
            .find(|v| v.chain == chain && v.symbol == symbol && v.option_type == option_type)
            .map(|v| v.address);
        async move {
            let state = match address {
                Some(addr) => match reader.vault_state(chain, addr).await {
                    Ok(state) => Some(state),
                    Err(e) => {
                        warn!(chain = %chain, symbol, vault = %addr, "Vault read failed: {e}");
                        None
                    }
                },
                None => None,
            };
            let strike_price = match state.as_ref().and_then(|s| s.current_option) {
                Some(option) => match reader.strike_price(chain, option).await {
                    Ok(Some(price)) => price,
                    Ok(None) => "-".to_string(),
                    Err(e) => {
                        warn!(chain = %chain, symbol, option = %option, "Strike price read failed: {e}");
                        "-".to_string()
                    }
                },
                None => "-".to_string(),
            };
            vault_product(chain, symbol, option_type, address, state.as_ref(), strike_price, expired_at)
        }
    });

    join_all(products).await
}

fn vault_product(
    chain: ChainId,
    symbol: &str,
    option_type: OptionType,
    address: Option<Address>,
    state: Option<&VaultState>,
    strike_price: String,
    expired_at: i64,
) -> DefiProduct {
    // A zero reading or zero decimals counts as unread.
    let shifted = |raw: U256, decimals: u8| (decimals > 0 && !raw.is_zero()).then(|| scale_units(raw, decimals));
    let cap = state
        .and_then(|s| shifted(s.cap, s.decimals))
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_VAULT_CAP);
    let total_balance = state
        .and_then(|s| shifted(s.total_balance, s.decimals))
        .and_then(|v| trim_number_string(&v, 4).parse::<f64>().ok())
        .unwrap_or(0.0);

    DefiProduct {
        chain_id: chain.id(),
        currency: symbol.to_string(),
        option_type,
        apy: DEFAULT_VAULT_APY.to_string(),
        expired_at,
        invest_currency: if option_type.is_call() {
            symbol.to_string()
        } else {
            "USDC".to_string()
        },
        strike_price,
        cap,
        total_balance,
        current_option: state.and_then(|s| s.current_option).map(|a| a.to_string()),
        address: address.map(|a| a.to_string()),
    }
}

/// Rebuilds the vault list on a fixed interval and replaces it in the store.
pub struct VaultWatcher {
    addresses: Vec<VaultAddress>,
    reader: Arc<dyn VaultReader>,
    store: Arc<ExplorerStore>,
    refresh: Duration,
}

impl VaultWatcher {
    pub fn new(
        addresses: Vec<VaultAddress>,
        reader: Arc<dyn VaultReader>,
        store: Arc<ExplorerStore>,
        refresh: Duration,
    ) -> Self {
        Self {
            addresses,
            reader,
            store,
            refresh,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.refresh);
        loop {
            ticker.tick().await;
            let vaults = build_vault_list(&self.addresses, self.reader.as_ref(), Utc::now()).await;
            let with_strike = vaults.iter().filter(|v| v.strike_price != "-").count();
            info!(vaults = vaults.len(), with_strike, "Vault refresh complete");
            self.store.set_vaults(vaults);
        }
    }
}
