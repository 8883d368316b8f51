use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT, VAULT_RECORD_TYPES};
use crate::error::Result;
use crate::pipeline::{DefiRecordRaw, ProductRaw, TopProductRaw};
use crate::types::{ApiResponse, ListPage, OrderRecord, Stat};

/// `getOrderRecord` filters. Unset fields are left off the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub page_num: u32,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invest_type: Option<i64>,
}

/// `getAccountRecord` filters. `types` is appended separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub page_size: u32,
    pub page_num: u32,
    pub chain_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductQuery {
    chain_id: i64,
    product_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainQuery {
    chain_id: i64,
}

/// Client for the Explorer backend. Every endpoint answers `{code, msg, data}`;
/// callers get the envelope back and decide what a non-success code means.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ExplorerClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: cfg.api_url.clone(),
        })
    }

    pub async fn order_records(&self, query: &OrderQuery) -> Result<ApiResponse<ListPage<OrderRecord>>> {
        self.send(self.request("getOrderRecord").query(query)).await
    }

    pub async fn product(&self, chain_id: i64, product_id: i64) -> Result<ApiResponse<ProductRaw>> {
        self.send(self.request("getProducts").query(&ProductQuery { chain_id, product_id }))
            .await
    }

    pub async fn top_products(&self, chain_id: i64) -> Result<ApiResponse<Vec<TopProductRaw>>> {
        self.send(self.request("topProducts").query(&ChainQuery { chain_id })).await
    }

    /// Path spelled as the backend spells it.
    pub async fn statistical(&self) -> Result<ApiResponse<Stat>> {
        self.send(self.request("expolerStatistical")).await
    }

    pub async fn account_records(&self, query: &HistoryQuery) -> Result<ApiResponse<ListPage<DefiRecordRaw>>> {
        self.send(self.account_records_request(query)).await
    }

    /// Record types go out as repeated `types` pairs.
    fn account_records_request(&self, query: &HistoryQuery) -> reqwest::RequestBuilder {
        self.request("getAccountRecord")
            .query(query)
            .query(&VAULT_RECORD_TYPES.map(|t| ("types", t)))
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        debug!(path, "GET");
        self.http.get(format!("{}/{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<ApiResponse<T>> {
        let resp = req.send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_url(query: &impl Serialize) -> String {
        reqwest::Client::new()
            .get("http://backend/web/getOrderRecord")
            .query(query)
            .build()
            .unwrap()
            .url()
            .to_string()
    }

    #[test]
    fn order_query_skips_unset_filters() {
        let query = OrderQuery {
            page_num: 1,
            page_size: 5,
            address: Some("0xabc".to_string()),
            ..OrderQuery::default()
        };
        assert_eq!(
            request_url(&query),
            "http://backend/web/getOrderRecord?pageNum=1&pageSize=5&address=0xabc"
        );
    }

    #[test]
    fn history_query_is_camel_case() {
        let query = HistoryQuery {
            account: None,
            page_size: 8,
            page_num: 2,
            chain_id: 56,
        };
        assert!(request_url(&query).ends_with("?pageSize=8&pageNum=2&chainId=56"));
    }

    #[test]
    fn account_records_repeat_the_types_pair() {
        let client = ExplorerClient {
            http: reqwest::Client::new(),
            base_url: "http://backend/web".to_string(),
        };
        let query = HistoryQuery {
            account: None,
            page_size: 8,
            page_num: 1,
            chain_id: 56,
        };
        let req = client.account_records_request(&query).build().unwrap();
        assert_eq!(
            req.url().as_str(),
            "http://backend/web/getAccountRecord?pageSize=8&pageNum=1&chainId=56&types=5&types=6&types=7&types=8"
        );
    }
}
