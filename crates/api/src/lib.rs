//! Red Bank liquidator clients for external services.
//!
//! This crate provides the chain-facing collaborators for `liquidator-core`:
//! - LCD: pools, balances, oracle prices and Red Bank collaterals
//! - Hive: batched position queries over GraphQL
//! - Redis: queue of unhealthy positions awaiting liquidation

mod error;
mod hive;
mod lcd;
mod queue;

pub use error::SourceError;
pub use hive::HiveClient;
pub use lcd::LcdClient;
pub use queue::RedisPositionQueue;
