use std::collections::HashMap;
use std::future::{Future, IntoFuture};

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;

use crate::config::RPC_HTTP_TIMEOUT;
use crate::error::{AppError, Result};
use crate::pipeline::numeric::scale_units;
use crate::types::{ChainId, SUPPORTED_CHAINS};

sol! {
    #[sol(rpc)]
    interface IVault {
        function decimals() external view returns (uint8);
        function cap() external view returns (uint256);
        function totalBalance() external view returns (uint256);
        function currentOption() external view returns (address);
    }

    #[sol(rpc)]
    interface IOptionToken {
        function decimals() external view returns (uint8);
        function strikePrice() external view returns (uint256);
    }
}

/// On-chain state of one vault contract. Amounts are in base units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaultState {
    pub decimals: u8,
    pub cap: U256,
    pub total_balance: U256,
    /// Option contract of the running round; `None` for the zero address.
    pub current_option: Option<Address>,
}

/// Read-only access to vault contracts.
#[async_trait]
pub trait VaultReader: Send + Sync {
    async fn vault_state(&self, chain: ChainId, vault: Address) -> Result<VaultState>;

    /// Strike of an option contract, shifted by its decimals.
    async fn strike_price(&self, chain: ChainId, option: Address) -> Result<Option<String>>;
}

/// Contract reads over each supported chain's public RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcVaultReader {
    endpoints: HashMap<ChainId, Url>,
}

impl RpcVaultReader {
    pub fn new() -> Result<Self> {
        let endpoints = SUPPORTED_CHAINS
            .iter()
            .map(|&chain| {
                chain
                    .rpc_url()
                    .parse::<Url>()
                    .map(|url| (chain, url))
                    .map_err(|e| AppError::Config(format!("invalid RPC URL for {chain}: {e}")))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { endpoints })
    }

    fn provider(&self, chain: ChainId) -> Result<impl Provider> {
        let url = self
            .endpoints
            .get(&chain)
            .cloned()
            .ok_or_else(|| AppError::Rpc(format!("no RPC endpoint for {chain}")))?;
        Ok(ProviderBuilder::new().connect_http(url))
    }
}

async fn within_timeout<T>(
    what: String,
    call: impl Future<Output = std::result::Result<T, alloy::contract::Error>>,
) -> Result<T> {
    tokio::time::timeout(RPC_HTTP_TIMEOUT, call)
        .await
        .map_err(|_| AppError::Rpc(format!("{what}: timed out")))?
        .map_err(AppError::from)
}

#[async_trait]
impl VaultReader for RpcVaultReader {
    async fn vault_state(&self, chain: ChainId, vault: Address) -> Result<VaultState> {
        let contract = IVault::new(vault, self.provider(chain)?);
        let decimals = contract.decimals();
        let cap = contract.cap();
        let total_balance = contract.totalBalance();
        let current_option = contract.currentOption();

        let (decimals, cap, total_balance, current_option) = within_timeout(format!("vault {vault} on {chain}"), async {
            tokio::try_join!(
                decimals.call().into_future(),
                cap.call().into_future(),
                total_balance.call().into_future(),
                current_option.call().into_future(),
            )
        })
        .await?;

        Ok(VaultState {
            decimals,
            cap,
            total_balance,
            current_option: (!current_option.is_zero()).then_some(current_option),
        })
    }

    async fn strike_price(&self, chain: ChainId, option: Address) -> Result<Option<String>> {
        if option.is_zero() {
            return Ok(None);
        }
        let contract = IOptionToken::new(option, self.provider(chain)?);
        let price = contract.strikePrice();
        let decimals = contract.decimals();

        let (price, decimals) = within_timeout(format!("option {option} on {chain}"), async {
            tokio::try_join!(price.call().into_future(), decimals.call().into_future())
        })
        .await?;
        Ok(Some(scale_units(price, decimals)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn selectors_match_known_signatures() {
        assert_eq!(IVault::decimalsCall::SELECTOR, [0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(IVault::capCall::SIGNATURE, "cap()");
        assert_eq!(IOptionToken::strikePriceCall::SIGNATURE, "strikePrice()");
    }

    #[test]
    fn endpoints_cover_supported_chains() {
        let reader = RpcVaultReader::new().unwrap();
        for chain in SUPPORTED_CHAINS {
            assert!(reader.endpoints.contains_key(&chain));
        }
        assert!(reader.provider(ChainId::Kovan).is_err());
    }

    #[tokio::test]
    async fn zero_option_has_no_strike() {
        let reader = RpcVaultReader::new().unwrap();
        assert_eq!(reader.strike_price(ChainId::Bsc, Address::ZERO).await.unwrap(), None);
    }
}
