//! Hive GraphQL client for batched Red Bank position queries.
//!
//! One request carries every address, each under its own alias
//! (`p0`, `p1`, ...), so a whole queue batch resolves in a single round trip.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::{debug, instrument, warn};

use liquidator_core::amount::parse_amount;
use liquidator_core::Position;

use crate::error::SourceError;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<HashMap<String, Option<UserData>>>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UserData {
    #[serde(default)]
    collaterals: Vec<HiveAsset>,
    #[serde(default)]
    debts: Vec<HiveAsset>,
}

#[derive(Debug, Deserialize)]
struct HiveAsset {
    denom: String,
    amount: String,
}

/// Hive GraphQL client.
#[derive(Debug, Clone)]
pub struct HiveClient {
    client: reqwest::Client,
    endpoint: String,
    redbank: String,
}

impl HiveClient {
    pub fn new(endpoint: impl Into<String>, redbank: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            redbank: redbank.into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Fetch collaterals and debts for every address, in input order.
    ///
    /// Addresses Hive returns nothing for are dropped.
    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    pub async fn fetch_positions(&self, addresses: &[String]) -> Result<Vec<Position>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let query = build_batch_query(&self.redbank, addresses);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query }))
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .context("Failed to decode Hive response")?;
        let positions = into_positions(addresses, body)?;
        debug!(resolved = positions.len(), "Fetched positions from Hive");
        Ok(positions)
    }
}

/// Build one aliased `wasm` selection per address.
fn build_batch_query(redbank: &str, addresses: &[String]) -> String {
    // JSON string literals are valid GraphQL string literals
    let redbank = json_string(redbank);
    let mut query = String::from("query {\n");
    for (i, address) in addresses.iter().enumerate() {
        let address = json_string(address);
        // write! into a String cannot fail
        let _ = write!(
            query,
            r#"  p{i}: wasm {{
    collaterals: contractQuery(contractAddress: {redbank}, query: {{ user_collaterals: {{ user: {address} }} }})
    debts: contractQuery(contractAddress: {redbank}, query: {{ user_debts: {{ user: {address} }} }})
  }}
"#
        );
    }
    query.push('}');
    query
}

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn into_positions(addresses: &[String], response: GraphQlResponse) -> Result<Vec<Position>> {
    let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
    let Some(mut data) = response.data else {
        if messages.is_empty() {
            return Err(SourceError::MissingData("hive batch".into()).into());
        }
        return Err(SourceError::GraphQl(messages.join("; ")).into());
    };
    if !messages.is_empty() {
        warn!(errors = %messages.join("; "), "Hive returned partial results");
    }

    let mut positions = Vec::with_capacity(addresses.len());
    for (i, address) in addresses.iter().enumerate() {
        let Some(Some(user)) = data.remove(&format!("p{i}")) else {
            debug!(user = %address, "No Hive data for address");
            continue;
        };
        let mut position = Position::new(address.clone());
        for asset in user.collaterals {
            if let Some(amount) = usable_amount(address, &asset) {
                position.collaterals.push(liquidator_core::AssetAmount::new(asset.denom, amount));
            }
        }
        for asset in user.debts {
            if let Some(amount) = usable_amount(address, &asset) {
                position.debts.push(liquidator_core::AssetAmount::new(asset.denom, amount));
            }
        }
        positions.push(position);
    }
    Ok(positions)
}

fn usable_amount(address: &str, asset: &HiveAsset) -> Option<Decimal> {
    match parse_amount(&asset.amount) {
        Some(amount) if amount > Decimal::ZERO => Some(amount),
        Some(_) => None,
        None => {
            warn!(user = %address, denom = %asset.denom, amount = %asset.amount, "Unparseable amount");
            None
        }
    }
}
