//! Constant-product pool records and the per-cycle pool snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

/// Index of the base asset in a pool's reserve pair.
pub const BASE_ASSET_INDEX: usize = 0;

/// Index of the quote asset in a pool's reserve pair.
pub const QUOTE_ASSET_INDEX: usize = 1;

/// Errors raised while building pool records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool {pool_id}: swap fee {fee} outside [0, 1)")]
    InvalidFee { pool_id: u64, fee: Decimal },

    #[error("pool {pool_id}: negative reserve of {denom}")]
    NegativeReserve { pool_id: u64, denom: String },

    #[error("pool {pool_id}: both reserves are {denom}")]
    DuplicateDenom { pool_id: u64, denom: String },

    #[error("pool {pool_id}: expected 2 assets, found {count}")]
    AssetCount { pool_id: u64, count: usize },
}

/// One reserve of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAsset {
    pub denom: String,
    pub amount: Decimal,
}

impl PoolAsset {
    pub fn new(denom: impl Into<String>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// A two-asset constant-product pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool identifier
    pub id: u64,
    /// Reserves; index order carries no meaning
    pub assets: [PoolAsset; 2],
    /// Swap fee as a fraction, e.g. 0.002 = 0.2%
    pub swap_fee: Decimal,
}

impl Pool {
    /// Create a validated pool.
    pub fn new(id: u64, base: PoolAsset, quote: PoolAsset, swap_fee: Decimal) -> Result<Self, PoolError> {
        if swap_fee < Decimal::ZERO || swap_fee >= Decimal::ONE {
            return Err(PoolError::InvalidFee { pool_id: id, fee: swap_fee });
        }
        for asset in [&base, &quote] {
            if asset.amount < Decimal::ZERO {
                return Err(PoolError::NegativeReserve {
                    pool_id: id,
                    denom: asset.denom.clone(),
                });
            }
        }
        if base.denom == quote.denom {
            return Err(PoolError::DuplicateDenom { pool_id: id, denom: base.denom });
        }

        Ok(Self {
            id,
            assets: [base, quote],
            swap_fee,
        })
    }

    /// Build a pool from an arbitrary asset list, rejecting anything but two assets.
    pub fn from_assets(id: u64, assets: Vec<PoolAsset>, swap_fee: Decimal) -> Result<Self, PoolError> {
        let count = assets.len();
        let [base, quote]: [PoolAsset; 2] = assets
            .try_into()
            .map_err(|_| PoolError::AssetCount { pool_id: id, count })?;
        Self::new(id, base, quote, swap_fee)
    }

    /// Check whether the pool holds `denom`.
    pub fn contains(&self, denom: &str) -> bool {
        self.assets.iter().any(|a| a.denom == denom)
    }

    /// Reserve entry for `denom`, resolved by denom rather than index.
    pub fn asset(&self, denom: &str) -> Option<&PoolAsset> {
        self.assets.iter().find(|a| a.denom == denom)
    }

    /// The reserve that is not `denom`.
    pub fn other_asset(&self, denom: &str) -> Option<&PoolAsset> {
        if self.assets[BASE_ASSET_INDEX].denom == denom {
            Some(&self.assets[QUOTE_ASSET_INDEX])
        } else if self.assets[QUOTE_ASSET_INDEX].denom == denom {
            Some(&self.assets[BASE_ASSET_INDEX])
        } else {
            None
        }
    }

    /// A pool with an empty reserve cannot be traded against.
    pub fn is_tradable(&self) -> bool {
        self.assets.iter().all(|a| a.amount > Decimal::ZERO)
    }
}

/// Immutable view of all pools for one decision cycle.
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    pools: Vec<Pool>,
}

impl PoolSnapshot {
    /// Build a snapshot. Pools with a duplicate id are dropped (first wins).
    pub fn new(pools: Vec<Pool>) -> Self {
        let mut seen = HashSet::with_capacity(pools.len());
        let pools = pools
            .into_iter()
            .filter(|pool| {
                let fresh = seen.insert(pool.id);
                if !fresh {
                    warn!(pool_id = pool.id, "Duplicate pool id in snapshot, ignoring");
                }
                fresh
            })
            .collect();
        Self { pools }
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn get(&self, id: u64) -> Option<&Pool> {
        self.pools.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(denom: &str, amount: u64) -> PoolAsset {
        PoolAsset::new(denom, Decimal::from(amount))
    }

    #[test]
    fn test_pool_validation() {
        assert!(Pool::new(1, asset("a", 1), asset("b", 1), Decimal::new(2, 3)).is_ok());
        assert!(Pool::new(1, asset("a", 1), asset("b", 1), Decimal::ZERO).is_ok());
        assert_eq!(
            Pool::new(1, asset("a", 1), asset("b", 1), Decimal::ONE),
            Err(PoolError::InvalidFee { pool_id: 1, fee: Decimal::ONE })
        );
        assert!(matches!(
            Pool::new(1, asset("a", 1), asset("a", 1), Decimal::ZERO),
            Err(PoolError::DuplicateDenom { .. })
        ));
        assert!(matches!(
            Pool::new(1, PoolAsset::new("a", Decimal::from(-1)), asset("b", 1), Decimal::ZERO),
            Err(PoolError::NegativeReserve { .. })
        ));
    }

    #[test]
    fn test_from_assets_requires_two() {
        let err = Pool::from_assets(7, vec![asset("a", 1), asset("b", 1), asset("c", 1)], Decimal::ZERO);
        assert_eq!(err, Err(PoolError::AssetCount { pool_id: 7, count: 3 }));
        assert!(Pool::from_assets(7, vec![asset("a", 1), asset("b", 1)], Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_asset_lookup_by_denom() {
        // quote listed first: lookups must not depend on index order
        let pool = Pool::new(3, asset("uosmo", 50), asset("uatom", 10), Decimal::ZERO).unwrap();
        assert_eq!(pool.asset("uatom").unwrap().amount, Decimal::from(10));
        assert_eq!(pool.other_asset("uatom").unwrap().denom, "uosmo");
        assert_eq!(pool.other_asset("uosmo").unwrap().denom, "uatom");
        assert!(pool.other_asset("uusdc").is_none());
        assert!(pool.contains("uosmo"));
        assert!(!pool.contains("uusdc"));
    }

    #[test]
    fn test_tradable() {
        let pool = Pool::new(1, asset("a", 0), asset("b", 10), Decimal::ZERO).unwrap();
        assert!(!pool.is_tradable());
        let pool = Pool::new(1, asset("a", 5), asset("b", 10), Decimal::ZERO).unwrap();
        assert!(pool.is_tradable());
    }

    #[test]
    fn test_snapshot_drops_duplicate_ids() {
        let first = Pool::new(1, asset("a", 1), asset("b", 1), Decimal::ZERO).unwrap();
        let second = Pool::new(1, asset("c", 1), asset("d", 1), Decimal::ZERO).unwrap();
        let snapshot = PoolSnapshot::new(vec![first.clone(), second]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(1), Some(&first));
    }
}
