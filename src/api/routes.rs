use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::config::{ALL_RECORDS_PAGE_SIZE, HISTORY_PAGE_SIZE, RECENT_PAGE_SIZE};
use crate::error::AppError;
use crate::feeds::{vault_history_query, Feeds};
use crate::fetcher::OrderQuery;
use crate::pipeline::format::{format_apy, format_date, format_datetime};
use crate::pipeline::views::{format_amount, order_amount, usd_value};
use crate::pipeline::{
    classify_status, filter_by_currency, filter_by_order_id, filter_by_status, paginate, product_status, sum_amount,
    transaction_row, vault_activity_row, DefiRecord, OrderStatus, Page, Product, Tab, TopProduct,
    TransactionRow,
};
use crate::state::{ExplorerStore, OrderPage, Snapshot, VaultHistory, ViewKey, ViewRegistry};
use crate::types::{ChainId, OrderRecord, PageParams, Stat, SUPPORTED_CHAINS};
use crate::vault::DefiProduct;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<ExplorerStore>,
    pub registry: Arc<ViewRegistry>,
    pub feeds: Feeds,
    pub health: Arc<HealthState>,
    /// How long a request waits for a freshly started view.
    pub warmup: Duration,
}

impl ApiState {
    /// Latest snapshot of `key`, starting its activation if needed.
    async fn view(&self, key: ViewKey) -> Result<Snapshot, AppError> {
        self.registry.touch_or_start(&key, || self.feeds.start(key.clone()));
        match self.store.wait_for(&key, self.warmup).await {
            Some(snapshot) => Ok(snapshot),
            None => Err(match self.store.last_error(&key) {
                Some(e) => AppError::Unavailable(format!("{key}: {e}")),
                None => AppError::Unavailable(format!("{key}: no data yet")),
            }),
        }
    }

    async fn orders(&self, query: OrderQuery) -> Result<OrderPage, AppError> {
        let key = ViewKey::Orders(query);
        match self.view(key).await? {
            Snapshot::Orders(page) => Ok(page),
            other => Err(mismatch("orders", &other)),
        }
    }
}

fn mismatch(expected: &str, got: &Snapshot) -> AppError {
    AppError::Unavailable(format!("expected {expected} snapshot, got {got:?}"))
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats", get(get_stats))
        .route("/prices", get(get_prices))
        .route("/transactions/recent", get(get_recent_transactions))
        .route("/products/top", get(get_top_products))
        .route("/products/:chain_id/:product_id", get(get_product))
        .route("/addresses/:address", get(get_address))
        .route("/orders/:order_id", get(get_order))
        .route("/vaults", get(get_vaults))
        .route("/vaults/history", get(get_vault_history))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainQuery {
    pub chain_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressQuery {
    pub tab: Option<Tab>,
    pub currency: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub chain_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultHistoryQuery {
    pub account: Option<String>,
    pub chain_id: Option<i64>,
    pub page: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// An order with its display fields derived.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub status_tag: OrderStatus,
    pub product_type: &'static str,
    pub chain_name: Option<&'static str>,
    pub exercise: &'static str,
    pub apy: String,
    pub invest_amount: String,
    pub usd_value: Option<f64>,
    pub created: String,
    pub expiry: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub address: String,
    pub tab: Tab,
    pub currency: String,
    pub orders: Page<OrderView>,
    pub total_invested: String,
    /// `None` when any order's invest currency has no known price.
    pub total_invested_usd: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    pub product: Product,
    pub status: OrderStatus,
    pub orders: Page<OrderView>,
}

#[derive(Debug, Serialize)]
pub struct RecentTransactions {
    pub orders: Vec<TransactionRow>,
    pub vaults: Vec<TransactionRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultHistoryView {
    pub records: Vec<DefiRecord>,
    pub page_params: PageParams,
}

// ---------------------------------------------------------------------------
// Derivations
// ---------------------------------------------------------------------------

pub fn order_view(order: OrderRecord, price: Option<f64>) -> OrderView {
    let amount = order_amount(&order);
    OrderView {
        status_tag: classify_status(&order),
        product_type: order.invest_type.label(),
        chain_name: order.chain().map(ChainId::name),
        exercise: order.option_type.exercise_label(),
        apy: format_apy(&order.annual_ror.to_string()),
        invest_amount: format!("{} {}", format_amount(amount), order.invest_currency),
        usd_value: usd_value(amount, price),
        created: format_datetime(order.ts),
        expiry: format_date(order.expired_at),
        order,
    }
}

pub fn address_view(
    address: String,
    orders: &[OrderRecord],
    params: &AddressQuery,
    price: impl Fn(&str) -> Option<f64>,
) -> AddressView {
    let tab = params.tab.unwrap_or_default();
    let currency = params.currency.clone().unwrap_or_else(|| "All".to_string());

    let by_status = filter_by_status(orders, tab.statuses());
    let filtered = filter_by_currency(&by_status, Some(currency.as_str()));

    let total = sum_amount(&filtered);
    let total_usd = filtered.iter().try_fold(0.0, |acc, o| {
        usd_value(order_amount(o), price(&o.invest_currency)).map(|v| acc + v)
    });

    let page = paginate(
        &filtered,
        params.page.unwrap_or(1),
        params.per_page.unwrap_or(u64::from(HISTORY_PAGE_SIZE)),
    );
    AddressView {
        address,
        tab,
        currency,
        orders: Page {
            slice: page
                .slice
                .into_iter()
                .map(|o| {
                    let p = price(&o.invest_currency);
                    order_view(o, p)
                })
                .collect(),
            page_params: page.page_params,
        },
        total_invested: format_amount(total),
        total_invested_usd: total_usd,
    }
}

fn known_chain(chain_id: i64) -> Result<ChainId, AppError> {
    ChainId::from_id(chain_id).ok_or_else(|| AppError::NotFound(format!("unknown chain {chain_id}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

async fn get_stats(State(state): State<ApiState>) -> Result<Json<Stat>, AppError> {
    match state.view(ViewKey::Stats).await? {
        Snapshot::Stats(stat) => Ok(Json(stat)),
        other => Err(mismatch("stats", &other)),
    }
}

async fn get_prices(State(state): State<ApiState>) -> Json<BTreeMap<String, f64>> {
    Json(state.store.prices())
}

async fn get_recent_transactions(
    State(state): State<ApiState>,
) -> Result<Json<RecentTransactions>, AppError> {
    let histories = SUPPORTED_CHAINS
        .iter()
        .map(|chain| state.view(ViewKey::VaultHistory(vault_history_query(chain.id(), 1, None))));
    let (orders, vaults) = tokio::join!(state.view(ViewKey::RecentOrders), recent_vault_activity(histories));

    let orders: Vec<TransactionRow> = match orders? {
        Snapshot::Orders(page) => page.records.iter().map(transaction_row).collect(),
        other => return Err(mismatch("orders", &other)),
    };

    Ok(Json(RecentTransactions { orders, vaults }))
}

/// Newest vault activity across chains, awaited together. A chain whose
/// history is unavailable is left out.
async fn recent_vault_activity<Fut>(histories: impl IntoIterator<Item = Fut>) -> Vec<TransactionRow>
where
    Fut: Future<Output = Result<Snapshot, AppError>>,
{
    let mut vaults: Vec<TransactionRow> = join_all(histories)
        .await
        .into_iter()
        .filter_map(|snapshot| match snapshot {
            Ok(Snapshot::VaultHistory(history)) => Some(history),
            _ => None,
        })
        .flat_map(|history| history.records.iter().map(vault_activity_row).collect::<Vec<_>>())
        .collect();
    vaults.sort_by(|a, b| b.time.cmp(&a.time));
    vaults.truncate(RECENT_PAGE_SIZE as usize);
    vaults
}

async fn get_top_products(
    State(state): State<ApiState>,
    Query(params): Query<ChainQuery>,
) -> Result<Json<Vec<TopProduct>>, AppError> {
    let chains = match params.chain_id {
        Some(id) => vec![known_chain(id)?],
        None => SUPPORTED_CHAINS.to_vec(),
    };

    let mut products = Vec::new();
    for chain in chains {
        match state.view(ViewKey::TopProducts(chain.id())).await? {
            Snapshot::TopProducts(top) => products.extend(top),
            other => return Err(mismatch("top products", &other)),
        }
    }
    Ok(Json(products))
}

async fn get_product(
    State(state): State<ApiState>,
    Path((chain_id, product_id)): Path<(i64, i64)>,
    Query(params): Query<PageQuery>,
) -> Result<Json<ProductDetail>, AppError> {
    known_chain(chain_id)?;

    let product = match state.view(ViewKey::Product { chain_id, product_id }).await? {
        Snapshot::Product(product) => product,
        other => return Err(mismatch("product", &other)),
    };
    let orders = state
        .orders(OrderQuery {
            page_num: 1,
            page_size: ALL_RECORDS_PAGE_SIZE,
            product_id: Some(product_id),
            chain_id: Some(chain_id),
            ..OrderQuery::default()
        })
        .await?;

    let page = paginate(
        &orders.records,
        params.page.unwrap_or(1),
        params.per_page.unwrap_or(u64::from(HISTORY_PAGE_SIZE)),
    );
    let status = product_status(&product);
    Ok(Json(ProductDetail {
        product,
        status,
        orders: Page {
            slice: page
                .slice
                .into_iter()
                .map(|o| {
                    let price = state.store.price(&o.invest_currency);
                    order_view(o, price)
                })
                .collect(),
            page_params: page.page_params,
        },
    }))
}

async fn get_address(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Query(params): Query<AddressQuery>,
) -> Result<Json<AddressView>, AppError> {
    if let Some(chain_id) = params.chain_id {
        known_chain(chain_id)?;
    }
    let orders = state
        .orders(OrderQuery {
            page_num: 1,
            page_size: ALL_RECORDS_PAGE_SIZE,
            address: Some(address.clone()),
            chain_id: params.chain_id,
            ..OrderQuery::default()
        })
        .await?;

    Ok(Json(address_view(address, &orders.records, &params, |symbol| {
        state.store.price(symbol)
    })))
}

async fn get_order(
    State(state): State<ApiState>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderView>, AppError> {
    let orders = state
        .orders(OrderQuery {
            page_num: 1,
            page_size: RECENT_PAGE_SIZE,
            order_id: Some(order_id),
            ..OrderQuery::default()
        })
        .await?;

    let order = filter_by_order_id(&orders.records, order_id)
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    let price = state.store.price(&order.invest_currency);
    Ok(Json(order_view(order, price)))
}

async fn get_vaults(State(state): State<ApiState>) -> Json<Vec<DefiProduct>> {
    Json(state.store.vaults())
}

async fn get_vault_history(
    State(state): State<ApiState>,
    Query(params): Query<VaultHistoryQuery>,
) -> Result<Json<VaultHistoryView>, AppError> {
    let chain = known_chain(params.chain_id.unwrap_or(ChainId::Bsc.id()))?;
    let key = ViewKey::VaultHistory(vault_history_query(
        chain.id(),
        params.page.unwrap_or(1),
        params.account.filter(|a| !a.is_empty()),
    ));

    match state.view(key).await? {
        Snapshot::VaultHistory(VaultHistory { records, page_params }) => {
            Ok(Json(VaultHistoryView { records, page_params }))
        }
        other => Err(mismatch("vault history", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::format::ActionType;
    use crate::pipeline::status::StatusKind;
    use crate::types::OptionType;
    use serde_json::json;

    fn history(chain_id: i64, timestamps: &[i64]) -> Snapshot {
        let records: Vec<DefiRecord> = timestamps
            .iter()
            .map(|&timestamp| DefiRecord {
                account: "0x35500253deb46fa8c2b271628c65dcf159206882".to_string(),
                chain_id,
                action_type: ActionType::Deposit,
                currency: "BTC".to_string(),
                call_put: OptionType::Call,
                invest_currency: "BTC".to_string(),
                amount: "1".to_string(),
                timestamp,
                hash: None,
            })
            .collect();
        Snapshot::VaultHistory(VaultHistory {
            page_params: PageParams::from_total(records.len() as u64, u64::from(HISTORY_PAGE_SIZE)),
            records,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn vault_histories_are_awaited_together() {
        let slow = |snapshot: Result<Snapshot, AppError>| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            snapshot
        };
        let started = tokio::time::Instant::now();
        let rows = recent_vault_activity(vec![
            slow(Ok(history(56, &[10, 30]))),
            slow(Err(AppError::Unavailable("down".to_string()))),
            slow(Ok(history(43114, &[20]))),
        ])
        .await;

        assert_eq!(started.elapsed(), Duration::from_secs(1));
        let times: Vec<i64> = rows.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![30, 20, 10]);
        assert_eq!(rows[1].chain_name, Some(ChainId::Avax.name()));
    }

    fn order(order_id: i64, invest_status: i64, currency: &str, invest_currency: &str, amount: f64) -> OrderRecord {
        serde_json::from_value(json!({
            "orderId": order_id,
            "investStatus": invest_status,
            "currency": currency,
            "investCurrency": invest_currency,
            "amount": amount,
            "multiplier": 1,
            "type": "CALL",
            "annualRor": "0.1",
            "ts": 1700000000,
            "expiredAt": 1700600000,
            "chainId": 56,
        }))
        .unwrap()
    }

    fn orders() -> Vec<OrderRecord> {
        vec![
            order(1, 2, "BTC", "BTC", 1.0),
            order(2, 3, "ETH", "ETH", 2.0),
            order(3, 4, "BTC", "USDT", 100.0),
            order(4, 2, "BTC", "BTC", 0.5),
        ]
    }

    fn prices(symbol: &str) -> Option<f64> {
        match symbol {
            "BTC" => Some(40_000.0),
            "ETH" => Some(2_000.0),
            "USDT" => Some(1.0),
            _ => None,
        }
    }

    #[test]
    fn positions_tab_front_loads_ready_to_settle() {
        let view = address_view("0xabc".to_string(), &orders(), &AddressQuery::default(), prices);
        let ids: Vec<i64> = view.orders.slice.iter().map(|o| o.order.order_id).collect();
        assert_eq!(ids, vec![2, 1, 4]);
        assert_eq!(view.currency, "All");
        assert_eq!(view.total_invested, "3.50");
        assert_eq!(view.total_invested_usd, Some(64_000.0));
    }

    #[test]
    fn currency_and_tab_filters_compose() {
        let params = AddressQuery {
            tab: Some(Tab::History),
            currency: Some("BTC".to_string()),
            ..AddressQuery::default()
        };
        let view = address_view("0xabc".to_string(), &orders(), &params, prices);
        assert_eq!(view.orders.slice.len(), 1);
        assert_eq!(view.orders.slice[0].order.order_id, 3);
        assert_eq!(view.orders.page_params, PageParams { count: 1, per_page: 8, total: 1 });
    }

    #[test]
    fn usd_total_needs_every_price() {
        let view = address_view("0xabc".to_string(), &orders(), &AddressQuery::default(), |s| {
            (s == "BTC").then_some(40_000.0)
        });
        assert_eq!(view.total_invested_usd, None);
    }

    #[test]
    fn pagination_applies_after_filtering() {
        let params = AddressQuery {
            page: Some(2),
            per_page: Some(2),
            ..AddressQuery::default()
        };
        let view = address_view("0xabc".to_string(), &orders(), &params, prices);
        let ids: Vec<i64> = view.orders.slice.iter().map(|o| o.order.order_id).collect();
        assert_eq!(ids, vec![4]);
        assert_eq!(view.orders.page_params.count, 2);
    }

    #[test]
    fn order_view_derives_display_fields() {
        let view = order_view(order(9, 4, "BTC", "USDT", 250.0), Some(1.0));
        assert_eq!(view.status_tag.kind, StatusKind::Success);
        assert_eq!(view.product_type, "Dual Investment");
        assert_eq!(view.chain_name, Some("Binance Smart Chain"));
        assert_eq!(view.exercise, "Upward");
        assert_eq!(view.apy, "10.00%");
        assert_eq!(view.invest_amount, "250.00 USDT");
        assert_eq!(view.usd_value, Some(250.0));
        assert_eq!(view.expiry, "Nov 21, 2023");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["orderId"], 9);
        assert_eq!(json["statusTag"]["label"], "Exercised");
    }
}
