use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::SUCCESS_CODE;
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Lenient wire decoding
// ---------------------------------------------------------------------------

/// The backend encodes most numerics as strings, some as numbers, and omits
/// optional fields freely. These accept either form and fall back to the
/// type's default on null or unparsable input.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn value_f64(v: &Value) -> Option<f64> {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    }

    pub fn value_i64(v: &Value) -> Option<i64> {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(value_f64(&v).unwrap_or_default())
    }

    pub fn i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(value_i64(&v).unwrap_or_default())
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(value_i64(&v).map(|n| n.max(0) as u64).unwrap_or_default())
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(match v {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        })
    }

    pub fn bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(match v {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_i64().map_or(false, |n| n != 0),
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            _ => false,
        })
    }
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainId {
    Mainnet,
    Ropsten,
    Rinkeby,
    Goerli,
    Kovan,
    Bsc,
    Avax,
}

/// Chains the explorer shows data for.
pub const SUPPORTED_CHAINS: [ChainId; 2] = [ChainId::Bsc, ChainId::Avax];

impl ChainId {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(ChainId::Mainnet),
            3 => Some(ChainId::Ropsten),
            4 => Some(ChainId::Rinkeby),
            5 => Some(ChainId::Goerli),
            42 => Some(ChainId::Kovan),
            56 => Some(ChainId::Bsc),
            43114 => Some(ChainId::Avax),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            ChainId::Mainnet => 1,
            ChainId::Ropsten => 3,
            ChainId::Rinkeby => 4,
            ChainId::Goerli => 5,
            ChainId::Kovan => 42,
            ChainId::Bsc => 56,
            ChainId::Avax => 43114,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChainId::Mainnet => "Ethereum",
            ChainId::Ropsten => "Ropsten",
            ChainId::Rinkeby => "Rinkeby",
            ChainId::Goerli => "Görli",
            ChainId::Kovan => "Kovan",
            ChainId::Bsc => "Binance Smart Chain",
            ChainId::Avax => "Avalanche",
        }
    }

    pub fn native_symbol(self) -> &'static str {
        match self {
            ChainId::Bsc => "BNB",
            ChainId::Avax => "AVAX",
            _ => "ETH",
        }
    }

    pub fn rpc_url(self) -> &'static str {
        match self {
            ChainId::Mainnet => "https://mainnet.infura.io/v3",
            ChainId::Ropsten => "https://ropsten.infura.io/v3/",
            ChainId::Rinkeby => "https://rinkeby.infura.io/v3/",
            ChainId::Goerli => "https://goerli.infura.io/v3/",
            ChainId::Kovan => "https://kovan.infura.io/v3/",
            ChainId::Bsc => "https://bsc-dataseed.binance.org",
            ChainId::Avax => "https://api.avax.network/ext/bc/C/rpc",
        }
    }

    /// Underlying coin of the CALL vault whose activity `getAccountRecord` reports.
    pub fn vault_coin_symbol(self) -> &'static str {
        self.native_symbol()
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_i64(self.id())
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Order classification
// ---------------------------------------------------------------------------

/// Lifecycle stage of an order. Also used for the coarse `status` field,
/// which shares the numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvestStatus {
    Confirming,
    Ordered,
    ReadyToSettle,
    Settled,
    OrderFailed,
    OrderSuccess,
    EverythingFailed,
    /// Anything outside 1..=7. Never matches a status filter.
    Unknown(i64),
}

impl InvestStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => InvestStatus::Confirming,
            2 => InvestStatus::Ordered,
            3 => InvestStatus::ReadyToSettle,
            4 => InvestStatus::Settled,
            5 => InvestStatus::OrderFailed,
            6 => InvestStatus::OrderSuccess,
            7 => InvestStatus::EverythingFailed,
            other => InvestStatus::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            InvestStatus::Confirming => 1,
            InvestStatus::Ordered => 2,
            InvestStatus::ReadyToSettle => 3,
            InvestStatus::Settled => 4,
            InvestStatus::OrderFailed => 5,
            InvestStatus::OrderSuccess => 6,
            InvestStatus::EverythingFailed => 7,
            InvestStatus::Unknown(code) => code,
        }
    }
}

impl<'de> Deserialize<'de> for InvestStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(d)?;
        Ok(lenient::value_i64(&v).map_or(InvestStatus::Unknown(0), InvestStatus::from_code))
    }
}

impl Serialize for InvestStatus {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_i64(self.code())
    }
}

/// Product family of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvestType {
    NotSet,
    DualInvest,
    Recurring,
    Vault,
    Unknown(i64),
}

impl InvestType {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => InvestType::NotSet,
            1 => InvestType::DualInvest,
            2 => InvestType::Recurring,
            3 => InvestType::Vault,
            other => InvestType::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            InvestType::NotSet => 0,
            InvestType::DualInvest => 1,
            InvestType::Recurring => 2,
            InvestType::Vault => 3,
            InvestType::Unknown(code) => code,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InvestType::Recurring => "Recurring Strategy",
            InvestType::Vault => "Defi Option Vault",
            _ => "Dual Investment",
        }
    }
}

impl Default for InvestType {
    fn default() -> Self {
        InvestType::NotSet
    }
}

impl<'de> Deserialize<'de> for InvestType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(d)?;
        Ok(lenient::value_i64(&v).map_or(InvestType::NotSet, InvestType::from_code))
    }
}

impl Serialize for InvestType {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_i64(self.code())
    }
}

/// Option direction of an order or product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OptionType {
    pub fn is_call(self) -> bool {
        self == OptionType::Call
    }

    /// `Upward` for CALL, `Downward` otherwise.
    pub fn exercise_label(self) -> &'static str {
        if self.is_call() {
            "Upward"
        } else {
            "Downward"
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OptionType::Call => "CALL",
            OptionType::Put => "PUT",
            OptionType::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Order record
// ---------------------------------------------------------------------------

/// A placed investment order as returned by `getOrderRecord`. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(deserialize_with = "lenient::i64")]
    pub order_id: i64,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub product_id: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub chain_id: i64,

    #[serde(default, deserialize_with = "lenient::f64")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub multiplier: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub strike_price: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub annual_ror: f64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub returned_amount: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub returned_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub delivery_price: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub index_price: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub earn: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub currency: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub invest_currency: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub strike_currency: Option<String>,
    #[serde(rename = "type", default)]
    pub option_type: OptionType,
    #[serde(default)]
    pub invest_type: InvestType,

    #[serde(default = "unknown_status")]
    pub invest_status: InvestStatus,
    #[serde(default = "unknown_status")]
    pub status: InvestStatus,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub is_liquidated: bool,

    #[serde(default, deserialize_with = "lenient::i64")]
    pub ts: i64,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub expired_at: i64,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub created_at: i64,

    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub confirm_order_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub hash: Option<String>,
}

fn unknown_status() -> InvestStatus {
    InvestStatus::Unknown(0)
}

impl OrderRecord {
    pub fn chain(&self) -> Option<ChainId> {
        ChainId::from_id(self.chain_id)
    }
}

/// Platform-wide counters from `expolerStatistical`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    #[serde(
        rename(deserialize = "TotalNamberOfOders", serialize = "totalOrders"),
        default,
        deserialize_with = "lenient::i64"
    )]
    pub total_orders: i64,
    #[serde(
        rename(deserialize = "CumulativeInvestmentAmount", serialize = "cumulativeInvestmentAmount"),
        default,
        deserialize_with = "lenient::string"
    )]
    pub cumulative_investment_amount: String,
    #[serde(
        rename(deserialize = "CumulativeNamberOUsers", serialize = "cumulativeUsers"),
        default,
        deserialize_with = "lenient::i64"
    )]
    pub cumulative_users: i64,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Shape of a paginated result set: `count` pages of `per_page` covering `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub count: u64,
    pub per_page: u64,
    pub total: u64,
}

impl PageParams {
    /// `count = ceil(total / per_page)`, or 0 when `per_page` is 0.
    pub fn from_total(total: u64, per_page: u64) -> Self {
        let count = if per_page == 0 { 0 } else { total.div_ceil(per_page) };
        Self { count, per_page, total }
    }
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

/// `{ code, msg?, data }` wrapper every backend endpoint returns.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(deserialize_with = "lenient::i64")]
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Validate the embedded code and take the payload.
    pub fn into_data(self) -> Result<T> {
        if !self.is_success() {
            return Err(AppError::Api {
                code: self.code,
                msg: self.msg.unwrap_or_default(),
            });
        }
        self.data.ok_or_else(|| AppError::Api {
            code: self.code,
            msg: "response carried no data".to_string(),
        })
    }
}

/// `data` of a list endpoint. Vault history puts its rows under `list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPage<T> {
    #[serde(alias = "list", default = "Vec::new")]
    pub records: Vec<T>,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub pages: u64,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub size: u64,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub total: u64,
}

impl<T> ListPage<T> {
    /// Page params as reported by the server (not recomputed).
    pub fn page_params(&self) -> PageParams {
        PageParams {
            count: self.pages,
            per_page: self.size,
            total: self.total,
        }
    }
}
