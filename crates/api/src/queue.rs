//! Redis queue of unhealthy positions awaiting liquidation.
//!
//! The health checker pushes work items onto a list; each cycle pops up to
//! a batch of them and resolves current position data through Hive.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient};
use serde::Deserialize;
use std::num::NonZeroUsize;
use tracing::{debug, info, instrument, warn};

use liquidator_core::{Position, PositionSource};

use crate::hive::HiveClient;

/// Queued item as written by the health checker. Only the address is used;
/// balances are re-read from Hive.
#[derive(Debug, Deserialize)]
struct WorkItem {
    address: String,
}

/// `PositionSource` backed by a Redis list and resolved through Hive.
#[derive(Clone)]
pub struct RedisPositionQueue {
    connection: MultiplexedConnection,
    key: String,
    hive: HiveClient,
}

impl RedisPositionQueue {
    /// Connect to `redis_url` and read work items from the list at `key`.
    pub async fn connect(redis_url: &str, key: impl Into<String>, hive: HiveClient) -> Result<Self> {
        let client = RedisClient::open(redis_url).context("Invalid Redis URL")?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .context("Failed to connect to Redis")?;
        let key = key.into();
        info!(queue = %key, "Redis position queue connected");
        Ok(Self { connection, key, hive })
    }

    /// Pop up to `limit` raw items from the head of the list.
    #[instrument(skip(self), fields(queue = %self.key))]
    pub async fn pop_items(&self, limit: usize) -> Result<Vec<String>> {
        let Some(count) = NonZeroUsize::new(limit) else {
            return Ok(Vec::new());
        };
        let mut conn = self.connection.clone();
        let items: Vec<String> = conn
            .lpop(&self.key, Some(count))
            .await
            .context("Failed to pop from position queue")?;
        debug!(popped = items.len(), "Popped queue items");
        Ok(items)
    }
}

/// Addresses from raw queue items, deduplicated in first-seen order.
///
/// Items are JSON work items or bare addresses; anything else is dropped.
fn parse_items(items: &[String]) -> Vec<String> {
    let mut addresses: Vec<String> = Vec::with_capacity(items.len());
    for raw in items {
        let Some(address) = parse_item(raw) else {
            warn!(item = %raw, "Dropping malformed queue item");
            continue;
        };
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    addresses
}

fn parse_item(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let address = if raw.starts_with('{') {
        let item: WorkItem = serde_json::from_str(raw).ok()?;
        item.address.trim().to_string()
    } else {
        raw.trim_matches('"').to_string()
    };
    is_valid_address(&address).then_some(address)
}

/// Bech32 addresses are ASCII alphanumerics only.
fn is_valid_address(address: &str) -> bool {
    !address.is_empty() && address.chars().all(|c| c.is_ascii_alphanumeric())
}

#[async_trait]
impl PositionSource for RedisPositionQueue {
    async fn next_batch(&self, limit: usize) -> Result<Vec<Position>> {
        let items = self.pop_items(limit).await?;
        let addresses = parse_items(&items);
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        self.hive.fetch_positions(&addresses).await
    }
}
