use serde::Serialize;

use crate::pipeline::format::Product;
use crate::types::{InvestStatus, OrderRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Failed,
    Warning,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderStatus {
    pub kind: StatusKind,
    pub label: &'static str,
}

impl OrderStatus {
    const fn new(kind: StatusKind, label: &'static str) -> Self {
        Self { kind, label }
    }
}

/// Classify an order for display. First match wins:
/// in-flight `invest_status`, then failed coarse `status`, then unexercised, else exercised.
pub fn classify_status(order: &OrderRecord) -> OrderStatus {
    if matches!(
        order.invest_status,
        InvestStatus::Ordered | InvestStatus::ReadyToSettle
    ) {
        return OrderStatus::new(StatusKind::Pending, "Progressing");
    }

    // Coarse status, not invest_status.
    if matches!(
        order.status,
        InvestStatus::OrderFailed | InvestStatus::EverythingFailed
    ) {
        return OrderStatus::new(StatusKind::Failed, "Failed");
    }

    if order.returned_currency.as_deref() == Some(order.invest_currency.as_str()) {
        return OrderStatus::new(StatusKind::Warning, "Unexercised");
    }

    OrderStatus::new(StatusKind::Success, "Exercised")
}

/// Active products are still taking orders.
pub fn product_status(product: &Product) -> OrderStatus {
    if product.is_active {
        OrderStatus::new(StatusKind::Pending, "Progressing")
    } else {
        OrderStatus::new(StatusKind::Success, "Finished")
    }
}
