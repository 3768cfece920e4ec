//! Collaborator abstractions for chain data and transaction submission.
//!
//! The planners only ever see the values these return. Implement the traits
//! to plug in a chain client, an indexer, a queue or an in-memory fake.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::messages::{Coin, Event, ProtocolMsg};
use crate::pool::Pool;
use crate::position::{Position, PriceTable};

/// Supplies the pools the router searches each cycle.
#[async_trait]
pub trait PoolSource: Send + Sync {
    async fn fetch_pools(&self) -> Result<Vec<Pool>>;
}

/// Supplies oracle prices in a common quote unit.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_prices(&self) -> Result<PriceTable>;
}

/// Supplies the liquidator's holdings.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Wallet balances of `address`.
    async fn fetch_balances(&self, address: &str) -> Result<Vec<Coin>>;

    /// Red Bank collateral deposits of `address`.
    async fn fetch_collaterals(&self, address: &str) -> Result<Vec<Coin>>;
}

/// Supplies positions queued for liquidation.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Up to `limit` positions. An empty batch means nothing is queued.
    async fn next_batch(&self, limit: usize) -> Result<Vec<Position>>;
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub height: u64,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Signs and broadcasts message batches.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn submit(&self, sender: &str, msgs: &[ProtocolMsg]) -> Result<BroadcastResult>;
}
