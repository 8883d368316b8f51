use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::fetcher::{HistoryQuery, OrderQuery};
use crate::pipeline::{DefiRecord, Product, TopProduct};
use crate::poller::Liveness;
use crate::types::{OrderRecord, PageParams, Stat};
use crate::vault::DefiProduct;

// ---------------------------------------------------------------------------
// View keys and snapshots
// ---------------------------------------------------------------------------

/// Identity of one polled view. Two requests for the same key share an activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Stats,
    RecentOrders,
    Orders(OrderQuery),
    Product { chain_id: i64, product_id: i64 },
    TopProducts(i64),
    VaultHistory(HistoryQuery),
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKey::Stats => write!(f, "stats"),
            ViewKey::RecentOrders => write!(f, "recent-orders"),
            ViewKey::Orders(q) => {
                write!(f, "orders")?;
                if let Some(address) = &q.address {
                    write!(f, " address={address}")?;
                }
                if let Some(order_id) = q.order_id {
                    write!(f, " order={order_id}")?;
                }
                if let Some(product_id) = q.product_id {
                    write!(f, " product={product_id}")?;
                }
                if let Some(chain_id) = q.chain_id {
                    write!(f, " chain={chain_id}")?;
                }
                Ok(())
            }
            ViewKey::Product { chain_id, product_id } => write!(f, "product {chain_id}/{product_id}"),
            ViewKey::TopProducts(chain_id) => write!(f, "top-products chain={chain_id}"),
            ViewKey::VaultHistory(q) => {
                write!(f, "vault-history chain={} page={}", q.chain_id, q.page_num)?;
                if let Some(account) = &q.account {
                    write!(f, " account={account}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub records: Vec<OrderRecord>,
    pub page_params: PageParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultHistory {
    pub records: Vec<DefiRecord>,
    pub page_params: PageParams,
}

/// Latest successful payload of a view, already run through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Stats(Stat),
    Orders(OrderPage),
    Product(Product),
    TopProducts(Vec<TopProduct>),
    VaultHistory(VaultHistory),
}

// ---------------------------------------------------------------------------
// ExplorerStore
// ---------------------------------------------------------------------------

pub struct ExplorerStore {
    /// view → latest snapshot, replaced wholesale on each successful tick
    snapshots: DashMap<ViewKey, Snapshot>,
    /// view → last failure message, cleared by the next success
    errors: DashMap<ViewKey, String>,
    /// symbol → spot price in USDT
    prices: DashMap<String, f64>,
    vaults: DashMap<(i64, String, String), DefiProduct>,
    updated: Notify,
}

impl ExplorerStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshots: DashMap::new(),
            errors: DashMap::new(),
            prices: DashMap::new(),
            vaults: DashMap::new(),
            updated: Notify::new(),
        })
    }

    /// Store `snapshot` unless its activation was cancelled. Liveness is
    /// checked under the entry lock, so a view evicted concurrently is never
    /// written back. Returns whether the snapshot was stored.
    pub fn put(&self, key: ViewKey, snapshot: Snapshot, liveness: &Liveness) -> bool {
        let entry = self.snapshots.entry(key.clone());
        if !liveness.is_alive() {
            return false;
        }
        entry.insert(snapshot);
        self.errors.remove(&key);
        self.updated.notify_waiters();
        true
    }

    pub fn get(&self, key: &ViewKey) -> Option<Snapshot> {
        self.snapshots.get(key).map(|s| s.value().clone())
    }

    /// Same liveness rule as [`ExplorerStore::put`].
    pub fn record_error(&self, key: &ViewKey, message: String, liveness: &Liveness) -> bool {
        let entry = self.errors.entry(key.clone());
        if !liveness.is_alive() {
            return false;
        }
        entry.insert(message);
        self.updated.notify_waiters();
        true
    }

    pub fn clear_error(&self, key: &ViewKey) {
        self.errors.remove(key);
    }

    pub fn last_error(&self, key: &ViewKey) -> Option<String> {
        self.errors.get(key).map(|e| e.value().clone())
    }

    /// Forget a view whose activation was evicted.
    pub fn remove(&self, key: &ViewKey) {
        self.snapshots.remove(key);
        self.errors.remove(key);
    }

    /// Wait up to `timeout` for a snapshot of `key`. Returns early with `None`
    /// once the view reports a failure and still has nothing to show.
    pub async fn wait_for(&self, key: &ViewKey, timeout: Duration) -> Option<Snapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.updated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(snapshot) = self.get(key) {
                return Some(snapshot);
            }
            if self.errors.contains_key(key) {
                return None;
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.get(key);
            }
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_ascii_uppercase(), price);
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(&symbol.to_ascii_uppercase()).map(|p| *p)
    }

    pub fn prices(&self) -> BTreeMap<String, f64> {
        self.prices.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }

    /// Replace the vault list wholesale.
    pub fn set_vaults(&self, vaults: Vec<DefiProduct>) {
        self.vaults.clear();
        for vault in vaults {
            let key = (vault.chain_id, vault.currency.clone(), vault.option_type.to_string());
            self.vaults.insert(key, vault);
        }
    }

    /// Ordered by chain, currency, then CALL before PUT.
    pub fn vaults(&self) -> Vec<DefiProduct> {
        let mut vaults: Vec<DefiProduct> = self.vaults.iter().map(|e| e.value().clone()).collect();
        vaults.sort_by(|a, b| {
            (a.chain_id, &a.currency, a.option_type.to_string())
                .cmp(&(b.chain_id, &b.currency, b.option_type.to_string()))
        });
        vaults
    }
}
