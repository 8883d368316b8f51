use serde::{Deserialize, Serialize};

use crate::types::{InvestStatus, OrderRecord, PageParams};

pub const POSITION_STATUSES: [InvestStatus; 2] = [InvestStatus::Ordered, InvestStatus::ReadyToSettle];

pub const HISTORY_STATUSES: [InvestStatus; 4] = [
    InvestStatus::Settled,
    InvestStatus::OrderFailed,
    InvestStatus::OrderSuccess,
    InvestStatus::EverythingFailed,
];

/// Address page tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Positions,
    History,
}

impl Tab {
    pub fn statuses(self) -> &'static [InvestStatus] {
        match self {
            Tab::Positions => &POSITION_STATUSES,
            Tab::History => &HISTORY_STATUSES,
        }
    }
}

/// Keep orders whose `invest_status` is in `statuses`. When the set includes
/// `ReadyToSettle`, those orders move to the front; relative order is otherwise kept.
pub fn filter_by_status(orders: &[OrderRecord], statuses: &[InvestStatus]) -> Vec<OrderRecord> {
    let kept = orders
        .iter()
        .filter(|o| !matches!(o.invest_status, InvestStatus::Unknown(_)))
        .filter(|o| statuses.contains(&o.invest_status))
        .cloned();

    if !statuses.contains(&InvestStatus::ReadyToSettle) {
        return kept.collect();
    }
    let (mut ready, rest): (Vec<_>, Vec<_>) =
        kept.partition(|o| o.invest_status == InvestStatus::ReadyToSettle);
    ready.extend(rest);
    ready
}

/// `None` or `"All"` keeps everything.
pub fn filter_by_currency(orders: &[OrderRecord], currency: Option<&str>) -> Vec<OrderRecord> {
    match currency {
        None => orders.to_vec(),
        Some(c) if c.eq_ignore_ascii_case("all") => orders.to_vec(),
        Some(c) => orders.iter().filter(|o| o.currency == c).cloned().collect(),
    }
}

pub fn filter_by_order_id(orders: &[OrderRecord], order_id: i64) -> Vec<OrderRecord> {
    orders.iter().filter(|o| o.order_id == order_id).cloned().collect()
}

/// PUT amounts are denominated in the strike currency.
pub fn order_amount(order: &OrderRecord) -> f64 {
    let scale = if order.option_type.is_call() {
        1.0
    } else {
        order.strike_price
    };
    order.amount * order.multiplier * scale
}

pub fn sum_by<T>(items: &[T], amount: impl Fn(&T) -> f64) -> f64 {
    items.iter().fold(0.0, |acc, item| acc + amount(item))
}

pub fn sum_amount(orders: &[OrderRecord]) -> f64 {
    sum_by(orders, order_amount)
}

pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

/// Spot conversion; `None` when no price is known for the currency.
pub fn usd_value(amount: f64, price: Option<f64>) -> Option<f64> {
    price.map(|p| amount * p)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub slice: Vec<T>,
    pub page_params: PageParams,
}

/// 1-based page of `list`. Out-of-range windows are empty.
pub fn paginate<T: Clone>(list: &[T], page: u64, per_page: u64) -> Page<T> {
    let page_params = PageParams::from_total(list.len() as u64, per_page);
    let slice = match page
        .checked_sub(1)
        .and_then(|p| p.checked_mul(per_page))
        .and_then(|start| usize::try_from(start).ok())
    {
        Some(start) if per_page > 0 && start < list.len() => {
            let end = start.saturating_add(per_page as usize).min(list.len());
            list[start..end].to_vec()
        }
        _ => Vec::new(),
    };
    Page { slice, page_params }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(order_id: i64, invest_status: i64) -> OrderRecord {
        serde_json::from_value(json!({ "orderId": order_id, "investStatus": invest_status })).unwrap()
    }

    fn priced(amount: f64, multiplier: f64, kind: &str, strike: f64) -> OrderRecord {
        serde_json::from_value(json!({
            "orderId": 1,
            "amount": amount,
            "multiplier": multiplier,
            "type": kind,
            "strikePrice": strike,
        }))
        .unwrap()
    }

    fn ids(orders: &[OrderRecord]) -> Vec<i64> {
        orders.iter().map(|o| o.order_id).collect()
    }

    #[test]
    fn ready_to_settle_moves_to_front() {
        let orders = vec![order(1, 2), order(2, 3), order(3, 2)];
        let got = filter_by_status(&orders, &POSITION_STATUSES);
        assert_eq!(ids(&got), vec![2, 1, 3]);
    }

    #[test]
    fn status_filter_without_ready_keeps_order() {
        let orders = vec![order(1, 4), order(2, 3), order(3, 7), order(4, 5)];
        let got = filter_by_status(&orders, &HISTORY_STATUSES);
        assert_eq!(ids(&got), vec![1, 3, 4]);
    }

    #[test]
    fn unknown_status_never_matches() {
        let orders = vec![order(1, 42), order(2, 2)];
        let got = filter_by_status(&orders, &[InvestStatus::Ordered, InvestStatus::Unknown(42)]);
        assert_eq!(ids(&got), vec![2]);
    }

    #[test]
    fn currency_filter_all_is_identity() {
        let mut btc = order(1, 2);
        btc.currency = "BTC".to_string();
        let mut eth = order(2, 2);
        eth.currency = "ETH".to_string();
        let orders = vec![btc, eth];

        assert_eq!(filter_by_currency(&orders, None).len(), 2);
        assert_eq!(filter_by_currency(&orders, Some("All")).len(), 2);
        assert_eq!(ids(&filter_by_currency(&orders, Some("ETH"))), vec![2]);
    }

    #[test]
    fn order_id_filter() {
        let orders = vec![order(1, 2), order(2, 2), order(1, 4)];
        assert_eq!(filter_by_order_id(&orders, 1).len(), 2);
        assert!(filter_by_order_id(&orders, 9).is_empty());
    }

    #[test]
    fn put_amounts_scale_by_strike() {
        let orders = vec![priced(10.0, 2.0, "CALL", 5.0), priced(4.0, 1.0, "PUT", 3.0)];
        let total = sum_amount(&orders);
        assert!((total - 32.0).abs() < 1e-9);
        assert_eq!(format_amount(total), "32.00");
        assert_eq!(sum_amount(&[]), 0.0);
    }

    #[test]
    fn unknown_type_scales_like_put() {
        let orders = vec![priced(2.0, 1.0, "STRADDLE", 3.0)];
        assert!((sum_amount(&orders) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn pages_reconstruct_the_list() {
        for len in [0usize, 1, 7, 8, 9, 23] {
            let list: Vec<usize> = (0..len).collect();
            for per_page in [1u64, 3, 8, 50] {
                let first = paginate(&list, 1, per_page);
                assert_eq!(first.page_params.total, len as u64);
                let mut rebuilt = Vec::new();
                for p in 1..=first.page_params.count {
                    rebuilt.extend(paginate(&list, p, per_page).slice);
                }
                assert_eq!(rebuilt, list, "len={len} per_page={per_page}");
            }
        }
    }

    #[test]
    fn out_of_range_pages_are_empty() {
        let list = vec![1, 2, 3];
        assert!(paginate(&list, 0, 2).slice.is_empty());
        assert!(paginate(&list, 3, 2).slice.is_empty());
        let zero = paginate(&list, 1, 0);
        assert!(zero.slice.is_empty());
        assert_eq!(zero.page_params.count, 0);
        assert_eq!(paginate(&list, 2, 2).slice, vec![3]);
    }

    #[test]
    fn usd_value_needs_a_price() {
        assert_eq!(usd_value(2.0, Some(1.5)), Some(3.0));
        assert_eq!(usd_value(2.0, None), None);
    }
}
