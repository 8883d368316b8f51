use std::time::Duration;

use alloy::primitives::Address;

use crate::error::{AppError, Result};
use crate::types::{ChainId, OptionType};

pub const API_URL: &str = "http://localhost:8080/web";
pub const PRICE_API_URL: &str = "https://api.binance.com";

/// Embedded `code` the backend uses for a successful response.
pub const SUCCESS_CODE: i64 = 200;

/// Default Polling Data Source interval (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

/// Default retry budget for the interval-driven path of a polling activation.
pub const DEFAULT_POLL_RETRIES: u32 = 5;

/// Capacity of the event channel between a polling activation and its consumer.
pub const CHANNEL_CAPACITY: usize = 64;

/// Vault history views poll a little faster than the default.
pub const HISTORY_POLL_INTERVAL_MS: u64 = 50_000;

/// All-currency price refresh interval (seconds).
pub const PRICE_REFRESH_SECS: u64 = 120;

/// On-chain vault enrichment interval (seconds).
pub const VAULT_REFRESH_SECS: u64 = 30;

/// Page size of the recent transactions feed on the home view.
pub const RECENT_PAGE_SIZE: u32 = 5;

/// Page size of vault activity history.
pub const HISTORY_PAGE_SIZE: u32 = 8;

/// Page size used when a view wants every record and paginates locally.
pub const ALL_RECORDS_PAGE_SIZE: u32 = 999_999;

/// `getAccountRecord` record types that describe vault deposits/withdrawals.
pub const VAULT_RECORD_TYPES: [u8; 4] = [5, 6, 7, 8];

/// Vault APY shown until the backend exposes one.
pub const DEFAULT_VAULT_APY: &str = "20%";

/// Cap reported for a vault whose on-chain state could not be read.
pub const DEFAULT_VAULT_CAP: f64 = 100.0;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const PRICE_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const RPC_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Currencies the price watcher keeps a spot price for.
pub const SUPPORTED_CURRENCY_SYMBOLS: &[&str] = &["BTC", "ETH", "BNB", "AVAX", "USDC", "USDT"];

/// Decimals of the vault tokens (all 18-decimal on BSC and Avalanche C-Chain).
pub const TOKEN_DECIMALS: u8 = 18;

/// Vault currencies offered per chain.
pub fn supported_vault_symbols(chain: ChainId) -> &'static [&'static str] {
    match chain {
        ChainId::Bsc => &["BTC", "ETH", "BNB"],
        ChainId::Avax => &["AVAX"],
        _ => &[],
    }
}

/// One configured on-chain vault contract.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultAddress {
    pub chain: ChainId,
    pub symbol: String,
    pub option_type: OptionType,
    pub address: Address,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub price_api_url: String,
    pub log_level: String,
    pub api_port: u16,
    pub poll_interval: Duration,
    pub poll_retries: u32,
    pub history_poll_interval: Duration,
    pub price_refresh: Duration,
    pub vault_refresh: Duration,
    /// Cap on request-driven polling activations (MAX_LIVE_VIEWS)
    pub max_live_views: usize,
    /// How long a request waits for a freshly started view (VIEW_WARMUP_MS)
    pub view_warmup: Duration,
    /// Vault contracts (VAULT_ADDRESSES, comma-separated `chainId:SYMBOL:CALL|PUT:0xaddr`)
    pub vault_addresses: Vec<VaultAddress>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_url: std::env::var("API_URL")
                .unwrap_or_else(|_| API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            price_api_url: std::env::var("PRICE_API_URL")
                .unwrap_or_else(|_| PRICE_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            poll_interval: Duration::from_millis(nonzero_env_or("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?),
            poll_retries: env_or("POLL_MAX_RETRIES", DEFAULT_POLL_RETRIES),
            history_poll_interval: Duration::from_millis(nonzero_env_or(
                "HISTORY_POLL_INTERVAL_MS",
                HISTORY_POLL_INTERVAL_MS,
            )?),
            price_refresh: Duration::from_secs(nonzero_env_or("PRICE_REFRESH_SECS", PRICE_REFRESH_SECS)?),
            vault_refresh: Duration::from_secs(nonzero_env_or("VAULT_REFRESH_SECS", VAULT_REFRESH_SECS)?),
            max_live_views: env_or("MAX_LIVE_VIEWS", 64usize),
            view_warmup: Duration::from_millis(env_or("VIEW_WARMUP_MS", 3_000u64)),
            vault_addresses: parse_vault_addresses(
                &std::env::var("VAULT_ADDRESSES").unwrap_or_default(),
            )?,
        })
    }

    /// Contract address of the vault for `(chain, symbol, option_type)`, if configured.
    pub fn vault_address(&self, chain: ChainId, symbol: &str, option_type: OptionType) -> Option<Address> {
        self.vault_addresses
            .iter()
            .find(|v| v.chain == chain && v.symbol == symbol && v.option_type == option_type)
            .map(|v| v.address)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Interval settings. Timers need a non-zero period, so zero is a config error.
fn nonzero_env_or(key: &str, default: u64) -> Result<u64> {
    nonzero(key, std::env::var(key).ok(), default)
}

fn nonzero(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    match raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(default) {
        0 => Err(AppError::Config(format!("{key} must be greater than zero"))),
        n => Ok(n),
    }
}

/// Parse `56:BTC:CALL:0xabc,56:BTC:PUT:0xdef`.
pub fn parse_vault_addresses(raw: &str) -> Result<Vec<VaultAddress>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let &[chain, symbol, kind, address] = parts.as_slice() else {
                return Err(AppError::Config(format!(
                    "VAULT_ADDRESSES entry '{entry}' must be chainId:SYMBOL:CALL|PUT:address"
                )));
            };
            let chain = chain
                .parse::<i64>()
                .ok()
                .and_then(ChainId::from_id)
                .ok_or_else(|| AppError::Config(format!("unknown chain id in '{entry}'")))?;
            let option_type = match kind.to_ascii_uppercase().as_str() {
                "CALL" => OptionType::Call,
                "PUT" => OptionType::Put,
                _ => return Err(AppError::Config(format!("vault type must be CALL or PUT in '{entry}'"))),
            };
            let address = address
                .parse::<Address>()
                .map_err(|e| AppError::Config(format!("invalid vault address in '{entry}': {e}")))?;
            Ok(VaultAddress {
                chain,
                symbol: symbol.to_ascii_uppercase(),
                option_type,
                address,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vault_address_entries() {
        let parsed = parse_vault_addresses(
            "56:btc:CALL:0x35500253deb46fa8c2b271628c65dcf159206882, \
             43114:AVAX:put:0x00000000000000000000000000000000000000de",
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].chain, ChainId::Bsc);
        assert_eq!(parsed[0].symbol, "BTC");
        assert_eq!(parsed[1].option_type, OptionType::Put);
        assert_eq!(parsed[1].address, Address::with_last_byte(0xde));
    }

    #[test]
    fn empty_vault_addresses_is_empty() {
        assert!(parse_vault_addresses("").unwrap().is_empty());
    }

    #[test]
    fn malformed_vault_entry_is_config_error() {
        assert!(matches!(parse_vault_addresses("56:BTC:0xabc"), Err(AppError::Config(_))));
        assert!(matches!(parse_vault_addresses("999:BTC:CALL:0xabc"), Err(AppError::Config(_))));
        assert!(matches!(parse_vault_addresses("56:BTC:CALL:0xabc"), Err(AppError::Config(_))));
    }

    #[test]
    fn zero_interval_is_config_error() {
        assert!(matches!(
            nonzero("POLL_INTERVAL_MS", Some("0".to_string()), 60_000),
            Err(AppError::Config(msg)) if msg.contains("POLL_INTERVAL_MS")
        ));
        assert_eq!(nonzero("PRICE_REFRESH_SECS", None, 120).unwrap(), 120);
        assert_eq!(nonzero("PRICE_REFRESH_SECS", Some("oops".to_string()), 120).unwrap(), 120);
        assert_eq!(nonzero("VAULT_REFRESH_SECS", Some(" 5 ".to_string()), 30).unwrap(), 5);
    }
}
