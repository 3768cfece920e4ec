//! LCD (chain REST) client: pools, balances, oracle prices and Red Bank
//! collateral deposits.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use liquidator_core::amount::parse_amount;
use liquidator_core::{BalanceSource, Coin, Pool, PoolAsset, PoolSource, PriceSource, PriceTable};

use crate::error::SourceError;

const PAGE_LIMIT: &str = "1000";

/// Stop following `next_key` after this many pages.
const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    pools: Vec<GammPool>,
    #[serde(default)]
    pagination: Option<PageResponse>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    next_key: Option<String>,
}

impl PoolsResponse {
    fn next_key(&self) -> Option<String> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next_key.clone())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct GammPool {
    id: String,
    #[serde(default)]
    pool_params: Option<PoolParams>,
    /// Absent on pool types the router cannot price
    #[serde(default)]
    pool_assets: Vec<GammPoolAsset>,
}

#[derive(Debug, Deserialize)]
struct PoolParams {
    swap_fee: String,
}

#[derive(Debug, Deserialize)]
struct GammPoolAsset {
    token: Coin,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    balances: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
struct SmartQueryResponse<T> {
    data: T,
}

/// One entry of the oracle's `prices` query.
#[derive(Debug, Deserialize)]
struct OraclePrice {
    denom: String,
    price: String,
}

/// One entry of Red Bank's `user_collaterals` query.
#[derive(Debug, Deserialize)]
struct UserCollateral {
    denom: String,
    amount: String,
}

/// LCD API client.
#[derive(Debug, Clone)]
pub struct LcdClient {
    client: reqwest::Client,
    base_url: String,
    redbank: String,
    oracle: String,
}

impl LcdClient {
    /// Create a client against `base_url` querying the given contracts.
    pub fn new(base_url: impl Into<String>, redbank: impl Into<String>, oracle: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            redbank: redbank.into(),
            oracle: oracle.into(),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                endpoint: url,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))
    }

    /// Run a wasm smart query against `contract`.
    pub async fn smart_query<T: DeserializeOwned>(&self, contract: &str, query: &serde_json::Value) -> Result<T> {
        let path = smart_query_path(contract, query);
        let response: SmartQueryResponse<T> = self.get_json(&path, &[]).await?;
        Ok(response.data)
    }

    /// Fetch every pool, following `pagination.next_key` until exhausted.
    #[instrument(skip(self))]
    pub async fn fetch_pools(&self) -> Result<Vec<Pool>> {
        let mut raw = Vec::new();
        let mut key: Option<String> = None;
        let mut pages = 0;

        loop {
            let page: PoolsResponse = {
                let mut query = vec![("pagination.limit", PAGE_LIMIT)];
                if let Some(key) = key.as_deref() {
                    query.push(("pagination.key", key));
                }
                self.get_json("/osmosis/gamm/v1beta1/pools", &query).await?
            };
            pages += 1;
            let next = page.next_key();
            raw.extend(page.pools);

            match next {
                Some(next) if pages < MAX_PAGES => key = Some(next),
                Some(_) => {
                    warn!(pages, fetched = raw.len(), "Pool pagination limit reached");
                    break;
                }
                None => break,
            }
        }

        let fetched = raw.len();
        let pools = into_pools(raw);
        info!(fetched, pages, usable = pools.len(), "Fetched pools");
        Ok(pools)
    }

    #[instrument(skip(self))]
    pub async fn fetch_balances(&self, address: &str) -> Result<Vec<Coin>> {
        let path = format!("/cosmos/bank/v1beta1/balances/{}", address);
        let response: BalancesResponse = self.get_json(&path, &[("pagination.limit", PAGE_LIMIT)]).await?;
        debug!(count = response.balances.len(), "Fetched balances");
        Ok(response.balances)
    }

    #[instrument(skip(self))]
    pub async fn fetch_prices(&self) -> Result<PriceTable> {
        let prices: Vec<OraclePrice> = self.smart_query(&self.oracle, &json!({ "prices": {} })).await?;
        let table = into_price_table(prices);
        debug!(count = table.len(), "Fetched oracle prices");
        Ok(table)
    }

    #[instrument(skip(self))]
    pub async fn fetch_collaterals(&self, address: &str) -> Result<Vec<Coin>> {
        let collaterals: Vec<UserCollateral> = self
            .smart_query(&self.redbank, &json!({ "user_collaterals": { "user": address } }))
            .await?;
        Ok(collaterals
            .into_iter()
            .map(|c| Coin {
                denom: c.denom,
                amount: c.amount,
            })
            .collect())
    }
}

fn smart_query_path(contract: &str, query: &serde_json::Value) -> String {
    let encoded = URL_SAFE.encode(query.to_string());
    format!("/cosmwasm/wasm/v1/contract/{}/smart/{}", contract, encoded)
}

/// Keep two-asset pools with parseable ids, fees and reserves.
fn into_pools(raw: Vec<GammPool>) -> Vec<Pool> {
    raw.into_iter()
        .filter_map(|p| {
            let id = p.id.parse::<u64>().ok()?;
            let fee = p
                .pool_params
                .as_ref()
                .and_then(|params| parse_amount(&params.swap_fee))?;
            let assets = p
                .pool_assets
                .into_iter()
                .map(|a| Some(PoolAsset::new(a.token.denom, parse_amount(&a.token.amount)?)))
                .collect::<Option<Vec<_>>>()?;
            match Pool::from_assets(id, assets, fee) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    debug!(pool_id = id, error = %e, "Skipping pool");
                    None
                }
            }
        })
        .collect()
}

fn into_price_table(prices: Vec<OraclePrice>) -> PriceTable {
    prices
        .into_iter()
        .filter_map(|p| match parse_amount(&p.price) {
            Some(price) if price > Decimal::ZERO => Some((p.denom, price)),
            _ => {
                warn!(denom = %p.denom, price = %p.price, "Ignoring unusable oracle price");
                None
            }
        })
        .collect()
}

#[async_trait]
impl PoolSource for LcdClient {
    async fn fetch_pools(&self) -> Result<Vec<Pool>> {
        LcdClient::fetch_pools(self).await
    }
}

#[async_trait]
impl PriceSource for LcdClient {
    async fn fetch_prices(&self) -> Result<PriceTable> {
        LcdClient::fetch_prices(self).await
    }
}

#[async_trait]
impl BalanceSource for LcdClient {
    async fn fetch_balances(&self, address: &str) -> Result<Vec<Coin>> {
        LcdClient::fetch_balances(self, address).await
    }

    async fn fetch_collaterals(&self, address: &str) -> Result<Vec<Coin>> {
        LcdClient::fetch_collaterals(self, address).await
    }
}
