use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::api::health::HealthState;
use crate::config::{Config, HISTORY_PAGE_SIZE, RECENT_PAGE_SIZE};
use crate::error::{AppError, Result};
use crate::fetcher::{ExplorerClient, HistoryQuery, OrderQuery};
use crate::pipeline::{
    format_defi_record, format_product, format_top_product, DefiRecordRaw, ProductRaw, TopProductRaw,
};
use crate::poller::{Activation, PollConfig, PollEvent, Poller, TickOrigin};
use crate::state::{ExplorerStore, OrderPage, Snapshot, VaultHistory, ViewKey};
use crate::types::{ApiResponse, ChainId, ListPage, OrderRecord, SUPPORTED_CHAINS};

/// Query behind the first page of recent vault activity on a chain.
pub fn vault_history_query(chain_id: i64, page_num: u32, account: Option<String>) -> HistoryQuery {
    HistoryQuery {
        account,
        page_size: HISTORY_PAGE_SIZE,
        page_num: page_num.max(1),
        chain_id,
    }
}

pub fn recent_orders_query() -> OrderQuery {
    OrderQuery {
        page_num: 1,
        page_size: RECENT_PAGE_SIZE,
        ..OrderQuery::default()
    }
}

/// Starts polling activations for views and feeds their payloads, run
/// through the pipeline, into the store.
#[derive(Clone)]
pub struct Feeds {
    client: ExplorerClient,
    store: Arc<ExplorerStore>,
    health: Arc<HealthState>,
    poll: PollConfig,
    history_poll: PollConfig,
}

impl Feeds {
    pub fn new(cfg: &Config, client: ExplorerClient, store: Arc<ExplorerStore>, health: Arc<HealthState>) -> Self {
        Self {
            client,
            store,
            health,
            poll: PollConfig {
                delay: cfg.poll_interval,
                retries: cfg.poll_retries,
            },
            history_poll: PollConfig {
                delay: cfg.history_poll_interval,
                retries: cfg.poll_retries,
            },
        }
    }

    /// Views kept live for the whole process.
    pub fn background_keys() -> Vec<ViewKey> {
        let mut keys = vec![ViewKey::Stats, ViewKey::RecentOrders];
        for chain in SUPPORTED_CHAINS {
            keys.push(ViewKey::TopProducts(chain.id()));
            keys.push(ViewKey::VaultHistory(vault_history_query(chain.id(), 1, None)));
        }
        keys
    }

    pub fn start(&self, key: ViewKey) -> Activation {
        let client = self.client.clone();
        match &key {
            ViewKey::Stats => self.spawn(
                key,
                self.poll,
                move || {
                    let client = client.clone();
                    async move { client.statistical().await.map(Some) }
                },
                Snapshot::Stats,
            ),
            ViewKey::RecentOrders => {
                let query = recent_orders_query();
                self.spawn(key, self.poll, orders_fetch(client, query), order_snapshot)
            }
            ViewKey::Orders(query) => {
                let query = query.clone();
                self.spawn(key, self.poll, orders_fetch(client, query), order_snapshot)
            }
            &ViewKey::Product { chain_id, product_id } => self.spawn(
                key,
                self.poll,
                move || {
                    let client = client.clone();
                    async move {
                        if ChainId::from_id(chain_id).is_none() {
                            return Ok(None);
                        }
                        client.product(chain_id, product_id).await.map(Some)
                    }
                },
                product_snapshot,
            ),
            &ViewKey::TopProducts(chain_id) => self.spawn(
                key,
                self.poll,
                move || {
                    let client = client.clone();
                    async move {
                        if ChainId::from_id(chain_id).is_none() {
                            return Ok(None);
                        }
                        client.top_products(chain_id).await.map(Some)
                    }
                },
                top_products_snapshot,
            ),
            ViewKey::VaultHistory(query) => {
                let query = query.clone();
                self.spawn(
                    key,
                    self.history_poll,
                    move || {
                        let client = client.clone();
                        let query = query.clone();
                        async move {
                            if ChainId::from_id(query.chain_id).is_none() {
                                return Ok(None);
                            }
                            client.account_records(&query).await.map(Some)
                        }
                    },
                    vault_history_snapshot,
                )
            }
        }
    }

    fn spawn<T, F, Fut>(&self, key: ViewKey, config: PollConfig, fetch: F, to_snapshot: fn(T) -> Snapshot) -> Activation
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<ApiResponse<T>>>> + Send + 'static,
    {
        debug!(view = %key, delay_ms = config.delay.as_millis() as u64, retries = config.retries, "Starting view");
        self.store.clear_error(&key);

        let (activation, mut rx) = Poller::new(key.to_string(), fetch)
            .with_config(config)
            .with_health(Arc::clone(&self.health))
            .spawn();
        let liveness = activation.liveness();
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // Events still buffered after cancellation are dropped.
                let stored = match event {
                    PollEvent::Data(resp) => match resp.into_data() {
                        Ok(data) => store.put(key.clone(), to_snapshot(data), &liveness),
                        Err(e) => store.record_error(&key, e.to_string(), &liveness),
                    },
                    PollEvent::Failed { origin, error } => {
                        store.record_error(&key, failure_message(origin, &error), &liveness)
                    }
                };
                if !stored {
                    break;
                }
            }
        });

        activation
    }
}

fn failure_message(origin: TickOrigin, error: &AppError) -> String {
    format!("{origin} fetch failed: {error}")
}

fn orders_fetch(
    client: ExplorerClient,
    query: OrderQuery,
) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = Result<Option<ApiResponse<ListPage<OrderRecord>>>>> + Send>>
       + Send
       + Sync
       + 'static {
    move || {
        let client = client.clone();
        let query = query.clone();
        Box::pin(async move { client.order_records(&query).await.map(Some) })
    }
}

fn order_snapshot(page: ListPage<OrderRecord>) -> Snapshot {
    Snapshot::Orders(OrderPage {
        page_params: page.page_params(),
        records: page.records,
    })
}

fn product_snapshot(raw: ProductRaw) -> Snapshot {
    Snapshot::Product(format_product(&raw))
}

fn top_products_snapshot(raw: Vec<TopProductRaw>) -> Snapshot {
    Snapshot::TopProducts(raw.iter().map(format_top_product).collect())
}

fn vault_history_snapshot(page: ListPage<DefiRecordRaw>) -> Snapshot {
    Snapshot::VaultHistory(VaultHistory {
        page_params: page.page_params(),
        records: page.records.iter().filter_map(format_defi_record).collect(),
    })
}
