use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_VAULT_APY, TOKEN_DECIMALS, VAULT_RECORD_TYPES};
use crate::pipeline::numeric::{parse_precision, trim_number_string};
use crate::pipeline::views::{format_amount, order_amount};
use crate::types::{lenient, ChainId, InvestStatus, InvestType, OptionType, OrderRecord};

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// `getProducts` payload, as the backend sends it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductRaw {
    #[serde(default, deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub annual_ror: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub expired_at: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub currency: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub invest_currency: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub strike_currency: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub chain: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub re_invest: bool,
    #[serde(default, deserialize_with = "lenient::string")]
    pub index_price: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub strike_price: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub gt_strike_price: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub lt_strike_price: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub multiplier: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub order_limit: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub price: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub ts: i64,
    #[serde(rename = "type", default)]
    pub option_type: OptionType,
}

/// Display form of a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: i64,
    /// `MMM DD, YYYY`
    pub expired_at: String,
    /// Percentage with two decimals, or `-`.
    pub apy: String,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub chain: String,
    pub source: String,
    pub is_active: bool,
    pub is_recur: bool,
    pub strike_price: String,
    pub current_price: String,
    pub multiplier: String,
    pub currency: String,
    pub invest_currency: String,
    pub order_limit: String,
    /// Milliseconds.
    pub ts: i64,
    pub gt_strike_price: String,
    pub lt_strike_price: String,
    pub strike_currency: String,
    pub price: String,
}

pub fn format_product(raw: &ProductRaw) -> Product {
    Product {
        product_id: raw.product_id,
        expired_at: raw
            .expired_at
            .trim()
            .parse::<i64>()
            .map(format_date)
            .unwrap_or_else(|_| "-".to_string()),
        apy: format_apy(&raw.annual_ror),
        option_type: raw.option_type,
        chain: raw.chain.clone(),
        source: raw.source.clone(),
        is_active: raw.is_active,
        is_recur: raw.re_invest,
        strike_price: raw.strike_price.clone(),
        current_price: raw.index_price.clone(),
        multiplier: raw.multiplier.clone(),
        currency: raw.currency.clone(),
        invest_currency: raw.invest_currency.clone(),
        order_limit: raw.order_limit.clone(),
        ts: raw.ts.saturating_mul(1000),
        gt_strike_price: raw.gt_strike_price.clone(),
        lt_strike_price: raw.lt_strike_price.clone(),
        strike_currency: raw.strike_currency.clone(),
        price: raw.price.clone(),
    }
}

/// `topProducts` row, as the backend sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct TopProductRaw {
    #[serde(default, deserialize_with = "lenient::string")]
    pub invest_currency: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub amount: String,
    #[serde(default = "unknown_status")]
    pub invest_status: InvestStatus,
    #[serde(default, deserialize_with = "lenient::string")]
    pub multiplier: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub amount_raw: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default)]
    pub invest_type: InvestType,
    #[serde(default, deserialize_with = "lenient::string")]
    pub amount_u: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub strike_price: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub expired_at: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub ts: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub order_id: i64,
    #[serde(rename = "type", default)]
    pub option_type: OptionType,
}

fn unknown_status() -> InvestStatus {
    InvestStatus::Unknown(0)
}

/// Leaderboard projection. Values are passed through unformatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub invest_currency: String,
    pub amount: String,
    pub invest_status: InvestStatus,
    pub multiplier: String,
    pub amount_raw: String,
    pub product_id: i64,
    pub invest_type: InvestType,
    pub amount_u: String,
    pub strike_price: String,
    pub expired_at: String,
    pub ts: String,
    pub order_id: i64,
    #[serde(rename = "type")]
    pub option_type: OptionType,
}

pub fn format_top_product(raw: &TopProductRaw) -> TopProduct {
    TopProduct {
        invest_currency: raw.invest_currency.clone(),
        amount: raw.amount.clone(),
        invest_status: raw.invest_status,
        multiplier: raw.multiplier.clone(),
        amount_raw: raw.amount_raw.clone(),
        product_id: raw.product_id,
        invest_type: raw.invest_type,
        amount_u: raw.amount_u.clone(),
        strike_price: raw.strike_price.clone(),
        expired_at: raw.expired_at.clone(),
        ts: raw.ts.clone(),
        order_id: raw.order_id,
        option_type: raw.option_type,
    }
}

// ---------------------------------------------------------------------------
// Vault activity
// ---------------------------------------------------------------------------

/// `getAccountRecord` row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefiRecordRaw {
    #[serde(default, deserialize_with = "lenient::string")]
    pub account: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub chain_id: i64,
    #[serde(rename = "type", default, deserialize_with = "lenient::i64")]
    pub record_type: i64,
    /// Integer base units.
    #[serde(default, deserialize_with = "lenient::string")]
    pub amount: String,
    /// Seconds.
    #[serde(default, deserialize_with = "lenient::i64")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Deposit,
    Withdraw,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefiRecord {
    pub account: String,
    pub chain_id: i64,
    pub action_type: ActionType,
    pub currency: String,
    pub call_put: OptionType,
    pub invest_currency: String,
    pub amount: String,
    /// Milliseconds.
    pub timestamp: i64,
    pub hash: Option<String>,
}

/// Vault deposits/withdrawals only; other record types and unknown chains yield `None`.
pub fn format_defi_record(raw: &DefiRecordRaw) -> Option<DefiRecord> {
    let record_type = u8::try_from(raw.record_type).ok()?;
    if !VAULT_RECORD_TYPES.contains(&record_type) {
        return None;
    }
    let chain = ChainId::from_id(raw.chain_id)?;

    let call_put = if matches!(record_type, 5 | 6) {
        OptionType::Call
    } else {
        OptionType::Put
    };
    let action_type = if matches!(record_type, 6 | 8) {
        ActionType::Withdraw
    } else {
        ActionType::Deposit
    };
    let currency = chain.vault_coin_symbol().to_string();
    let invest_currency = if call_put.is_call() {
        currency.clone()
    } else {
        "USDC".to_string()
    };
    let amount = trim_number_string(
        &parse_precision(&trim_number_string(&raw.amount, 0), TOKEN_DECIMALS),
        6,
    );

    Some(DefiRecord {
        account: raw.account.clone(),
        chain_id: raw.chain_id,
        action_type,
        currency,
        call_put,
        invest_currency,
        amount,
        timestamp: raw.timestamp.saturating_mul(1000),
        hash: raw.hash.clone(),
    })
}

// ---------------------------------------------------------------------------
// Transaction rows
// ---------------------------------------------------------------------------

/// One line of the recent transactions feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow {
    pub product_type: &'static str,
    pub chain_name: Option<&'static str>,
    /// Milliseconds.
    pub time: i64,
    pub address: String,
    pub product_id: Option<i64>,
    pub order_id: Option<i64>,
    pub exercise: &'static str,
    pub apy: String,
    pub amount: String,
}

pub fn transaction_row(order: &OrderRecord) -> TransactionRow {
    TransactionRow {
        product_type: order.invest_type.label(),
        chain_name: order.chain().map(ChainId::name),
        time: order.ts.saturating_mul(1000),
        address: shorten_address(&order.address),
        product_id: Some(order.product_id),
        order_id: Some(order.order_id),
        exercise: order.option_type.exercise_label(),
        apy: format!("{:.2}%", order.annual_ror * 100.0),
        amount: format!("{} {}", format_amount(order_amount(order)), order.invest_currency),
    }
}

pub fn vault_activity_row(record: &DefiRecord) -> TransactionRow {
    TransactionRow {
        product_type: InvestType::Vault.label(),
        chain_name: ChainId::from_id(record.chain_id).map(ChainId::name),
        time: record.timestamp,
        address: shorten_address(&record.account),
        product_id: None,
        order_id: None,
        exercise: record.call_put.exercise_label(),
        apy: DEFAULT_VAULT_APY.to_string(),
        amount: format!("{} {}", record.amount, record.invest_currency),
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Fraction string → percentage with two decimals. Empty or unparsable → `-`.
pub fn format_apy(annual_ror: &str) -> String {
    match annual_ror.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => format!("{:.2}%", v * 100.0),
        _ => "-".to_string(),
    }
}

/// Epoch seconds → `MMM DD, YYYY` (UTC).
pub fn format_date(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Epoch seconds → `MMM DD, YYYY hh:mm AM UTC`.
pub fn format_datetime(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|d| d.format("%b %d, %Y %I:%M %p UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// `0x35500253DEB46fa8c2b271628c65DcF159206882` → `0x3550...6882`.
pub fn shorten_address(address: &str) -> String {
    if address.len() < 12 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_product(annual_ror: &str, expired_at: &str) -> ProductRaw {
        ProductRaw {
            product_id: 23,
            annual_ror: annual_ror.to_string(),
            expired_at: expired_at.to_string(),
            currency: "BTC".to_string(),
            invest_currency: "USDT".to_string(),
            index_price: "43000".to_string(),
            strike_price: "42000".to_string(),
            is_active: true,
            re_invest: true,
            ts: 1_700_000_000,
            option_type: OptionType::Put,
            ..ProductRaw::default()
        }
    }

    #[test]
    fn formats_apy_and_expiry() {
        let product = format_product(&raw_product("0.15", "1700000000"));
        assert_eq!(product.apy, "15.00%");
        assert_eq!(product.expired_at, "Nov 14, 2023");
        assert_eq!(product.current_price, "43000");
        assert_eq!(product.ts, 1_700_000_000_000);
        assert!(product.is_recur);
    }

    #[test]
    fn formatting_is_pure() {
        let raw = raw_product("0.15", "1700000000");
        assert_eq!(format_product(&raw), format_product(&raw));

        let zero = raw_product("0", "0");
        let first = format_product(&zero);
        assert_eq!(first, format_product(&zero));
        assert_eq!(first.apy, "0.00%");
        assert_eq!(first.expired_at, "Jan 01, 1970");
    }

    #[test]
    fn missing_apy_renders_dash() {
        assert_eq!(format_product(&raw_product("", "0")).apy, "-");
        assert_eq!(format_apy("n/a"), "-");
        assert_eq!(format_product(&raw_product("0.1", "soon")).expired_at, "-");
    }

    #[test]
    fn product_decodes_from_wire() {
        let raw: ProductRaw = serde_json::from_str(
            r#"{"product_id": 7, "annual_ror": "0.2", "expired_at": 1700000000, "type": "CALL",
                "is_active": true, "re_invest": false, "strike_price": "2000", "ts": 1700000000}"#,
        )
        .unwrap();
        let product = format_product(&raw);
        assert_eq!(product.apy, "20.00%");
        assert_eq!(product.option_type, OptionType::Call);
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["type"], "CALL");
        assert_eq!(json["strikePrice"], "2000");
    }

    #[test]
    fn top_product_is_a_pure_rename() {
        let raw: TopProductRaw = serde_json::from_str(
            r#"{"invest_currency": "USDT", "amount": "12", "invest_status": 2, "multiplier": "0.1",
                "amount_raw": "12000", "product_id": 3, "invest_type": 1, "amount_u": "12.5",
                "strike_price": "40000", "expired_at": "1700000000", "ts": "1699000000",
                "order_id": 9, "type": "PUT"}"#,
        )
        .unwrap();
        let top = format_top_product(&raw);
        assert_eq!(top.expired_at, "1700000000");
        assert_eq!(top.invest_status, InvestStatus::Ordered);
        assert_eq!(top.invest_type, InvestType::DualInvest);
        assert_eq!(top, format_top_product(&raw));
        assert_eq!(serde_json::to_value(&top).unwrap()["amountU"], "12.5");
    }

    fn defi_raw(record_type: i64, amount: &str) -> DefiRecordRaw {
        DefiRecordRaw {
            account: "0x35500253DEB46fa8c2b271628c65DcF159206882".to_string(),
            chain_id: 56,
            record_type,
            amount: amount.to_string(),
            timestamp: 1_700_000_000,
            hash: None,
        }
    }

    #[test]
    fn vault_records_map_type_to_direction_and_action() {
        let call_deposit = format_defi_record(&defi_raw(5, "1500000000000000000")).unwrap();
        assert_eq!(call_deposit.call_put, OptionType::Call);
        assert_eq!(call_deposit.action_type, ActionType::Deposit);
        assert_eq!(call_deposit.currency, "BNB");
        assert_eq!(call_deposit.invest_currency, "BNB");
        assert_eq!(call_deposit.amount, "1.5");
        assert_eq!(call_deposit.timestamp, 1_700_000_000_000);

        let put_withdraw = format_defi_record(&defi_raw(8, "1234567891234567891")).unwrap();
        assert_eq!(put_withdraw.call_put, OptionType::Put);
        assert_eq!(put_withdraw.action_type, ActionType::Withdraw);
        assert_eq!(put_withdraw.invest_currency, "USDC");
        assert_eq!(put_withdraw.amount, "1.234567");
    }

    #[test]
    fn non_vault_records_are_dropped() {
        assert!(format_defi_record(&defi_raw(1, "1")).is_none());
        assert!(format_defi_record(&defi_raw(9, "1")).is_none());
        let mut unknown_chain = defi_raw(5, "1");
        unknown_chain.chain_id = 999;
        assert!(format_defi_record(&unknown_chain).is_none());
    }

    #[test]
    fn shortens_addresses() {
        assert_eq!(
            shorten_address("0x35500253DEB46fa8c2b271628c65DcF159206882"),
            "0x3550...6882"
        );
        assert_eq!(shorten_address("0xabc"), "0xabc");
    }

    #[test]
    fn datetime_has_utc_suffix() {
        assert_eq!(format_datetime(0), "Jan 01, 1970 12:00 AM UTC");
    }
}
