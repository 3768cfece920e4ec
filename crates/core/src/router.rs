//! AMM router: path discovery and constant-product pricing.
//!
//! The router enumerates every simple path (no pool used twice) between two
//! denoms over a [`PoolSnapshot`] and prices routes exactly, both forward
//! (output for a given input) and inverse (input for a required output).
//!
//! Reserves are frozen into each [`RouteHop`] when the path is built, so a
//! route keeps pricing against the snapshot it was discovered in.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::amount;
use crate::pool::{Pool, PoolSnapshot};

/// Routing and pricing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Zero (or negative) amount handed to an estimator, or an empty route.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// No candidate route exists between the two denoms.
    #[error("no route from {token_in} to {token_out}")]
    NoRouteFound { token_in: String, token_out: String },

    /// Required output meets or exceeds the hop's output reserve.
    #[error("insufficient liquidity in pool {pool_id}: need {requested} {denom}, reserve {reserve}")]
    InsufficientLiquidity {
        pool_id: u64,
        denom: String,
        requested: Decimal,
        reserve: Decimal,
    },

    /// Decimal overflow while pricing a hop.
    #[error("arithmetic overflow pricing pool {pool_id}")]
    Overflow { pool_id: u64 },
}

/// One single-pool leg of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHop {
    pub pool_id: u64,
    pub token_in_denom: String,
    pub token_out_denom: String,
    pub swap_fee: Decimal,
    /// Reserve of the input asset at path construction
    pub x1: Decimal,
    /// Reserve of the output asset at path construction
    pub y1: Decimal,
}

impl RouteHop {
    /// Build a hop through `pool`, resolving reserves by denom.
    ///
    /// Returns `None` when either denom is missing from the pool or both are equal.
    pub fn through(pool: &Pool, token_in: &str, token_out: &str) -> Option<Self> {
        if token_in == token_out {
            return None;
        }
        let input = pool.asset(token_in)?;
        let output = pool.asset(token_out)?;
        Some(Self {
            pool_id: pool.id,
            token_in_denom: input.denom.clone(),
            token_out_denom: output.denom.clone(),
            swap_fee: pool.swap_fee,
            x1: input.amount,
            y1: output.amount,
        })
    }

    /// Post-fee output for `dx` entering this hop.
    ///
    /// out = y1 * dx / (x1 + dx), then out * (1 - fee)
    pub fn output_for(&self, dx: Decimal) -> Result<Decimal, RouteError> {
        let overflow = || RouteError::Overflow { pool_id: self.pool_id };
        let denominator = self.x1.checked_add(dx).ok_or_else(overflow)?;
        let before_fee = amount::mul_div(self.y1, dx, denominator).ok_or_else(overflow)?;
        amount::apply_discount(before_fee, self.swap_fee).ok_or_else(overflow)
    }

    /// Amount required for this hop to yield `dy`.
    ///
    /// dx = x1 * dy / (y1 - dy), plus the fee charged on `dy`.
    pub fn input_for(&self, dy: Decimal) -> Result<Decimal, RouteError> {
        if dy >= self.y1 {
            return Err(RouteError::InsufficientLiquidity {
                pool_id: self.pool_id,
                denom: self.token_out_denom.clone(),
                requested: dy,
                reserve: self.y1,
            });
        }
        let overflow = || RouteError::Overflow { pool_id: self.pool_id };
        let before_fee = amount::mul_div(self.x1, dy, self.y1 - dy).ok_or_else(overflow)?;
        let fee = dy.checked_mul(self.swap_fee).ok_or_else(overflow)?;
        before_fee.checked_add(fee).ok_or_else(overflow)
    }
}

/// An ordered, non-empty chain of hops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    hops: Vec<RouteHop>,
}

impl Route {
    /// Wrap a hop list. Returns `None` for an empty list or broken chaining.
    pub fn new(hops: Vec<RouteHop>) -> Option<Self> {
        let chained = hops
            .windows(2)
            .all(|pair| pair[0].token_out_denom == pair[1].token_in_denom);
        if hops.is_empty() || !chained {
            return None;
        }
        Some(Self { hops })
    }

    pub fn hops(&self) -> &[RouteHop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Input denom of the first hop.
    pub fn token_in(&self) -> &str {
        &self.hops[0].token_in_denom
    }

    /// Output denom of the last hop.
    pub fn token_out(&self) -> &str {
        &self.hops[self.hops.len() - 1].token_out_denom
    }

    pub fn pool_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.hops.iter().map(|h| h.pool_id)
    }

    /// Whether `pool_id` already appears on this route.
    pub fn uses_pool(&self, pool_id: u64) -> bool {
        self.hops.iter().any(|h| h.pool_id == pool_id)
    }

    /// Estimated output for `amount_in`, folding hop by hop.
    pub fn estimated_output(&self, amount_in: Decimal) -> Result<Decimal, RouteError> {
        if amount_in <= Decimal::ZERO {
            return Err(RouteError::InvalidInput("cannot use token in amount of 0"));
        }
        self.hops
            .iter()
            .try_fold(amount_in, |dx, hop| hop.output_for(dx))
    }

    /// Estimated input needed to receive `amount_out`.
    ///
    /// Folds over the hops in route order, treating the running amount as
    /// the output required from each hop.
    pub fn estimated_required_input(&self, amount_out: Decimal) -> Result<Decimal, RouteError> {
        if amount_out <= Decimal::ZERO {
            return Err(RouteError::InvalidInput("cannot use token out amount of 0"));
        }
        self.hops
            .iter()
            .try_fold(amount_out, |dy, hop| hop.input_for(dy))
    }
}

/// Router over one cycle's pool snapshot.
#[derive(Debug, Clone, Default)]
pub struct AmmRouter {
    snapshot: PoolSnapshot,
}

impl AmmRouter {
    /// Create a router over a snapshot.
    pub fn new(snapshot: PoolSnapshot) -> Self {
        Self { snapshot }
    }

    /// Replace the snapshot for a new cycle.
    pub fn set_pools(&mut self, pools: Vec<Pool>) {
        self.snapshot = PoolSnapshot::new(pools);
    }

    pub fn snapshot(&self) -> &PoolSnapshot {
        &self.snapshot
    }

    /// All simple routes from `token_in` to `token_out`.
    ///
    /// Depth-first search from an empty path. At each step the usable pools
    /// are those holding the current asset that are not already on the path.
    /// A pool that also holds the target completes a route, and every usable
    /// pool is additionally explored towards its other asset, so both short
    /// and long paths through the same junction pool are returned.
    pub fn get_routes(&self, token_in: &str, token_out: &str) -> Vec<Route> {
        let mut routes = Vec::new();
        let mut path = Vec::with_capacity(self.snapshot.len());
        self.build_routes(token_in, token_out, &mut path, &mut routes);

        debug!(
            token_in,
            token_out,
            routes = routes.len(),
            pools = self.snapshot.len(),
            "Route search complete"
        );
        routes
    }

    fn build_routes(
        &self,
        held: &str,
        target: &str,
        path: &mut Vec<RouteHop>,
        routes: &mut Vec<Route>,
    ) {
        let usable: Vec<&Pool> = self
            .snapshot
            .pools()
            .iter()
            .filter(|pool| {
                pool.is_tradable()
                    && pool.contains(held)
                    && !path.iter().any(|hop| hop.pool_id == pool.id)
            })
            .collect();

        if usable.is_empty() {
            return;
        }

        if held != target {
            for pool in usable.iter().filter(|pool| pool.contains(target)) {
                if let Some(hop) = RouteHop::through(pool, held, target) {
                    path.push(hop);
                    routes.push(Route { hops: path.clone() });
                    path.pop();
                }
            }
        }

        for pool in &usable {
            let Some(next) = pool.other_asset(held) else {
                continue;
            };
            let Some(hop) = RouteHop::through(pool, held, &next.denom) else {
                continue;
            };
            path.push(hop);
            self.build_routes(&next.denom, target, path, routes);
            path.pop();
        }
    }

    /// Estimated output of `route` for `amount_in`.
    ///
    /// A zero input is reported and returned as `InvalidInput`.
    pub fn get_estimated_output(&self, amount_in: Decimal, route: &Route) -> Result<Decimal, RouteError> {
        route.estimated_output(amount_in).map_err(|e| {
            if matches!(e, RouteError::InvalidInput(_)) {
                warn!(error = %e, token_in = route.token_in(), "Output estimation rejected");
            }
            e
        })
    }

    /// Estimated input required for `route` to deliver `amount_out`.
    pub fn get_estimated_required_input(
        &self,
        amount_out: Decimal,
        route: &Route,
    ) -> Result<Decimal, RouteError> {
        route.estimated_required_input(amount_out).map_err(|e| {
            match &e {
                RouteError::InvalidInput(_) => {
                    warn!(error = %e, token_out = route.token_out(), "Required input estimation rejected")
                }
                RouteError::InsufficientLiquidity { .. } => {
                    debug!(error = %e, token_out = route.token_out(), "Route cannot deliver amount")
                }
                _ => {}
            }
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolAsset;
    use std::collections::HashSet;

    fn pool(id: u64, a: (&str, u64), b: (&str, u64), fee: Decimal) -> Pool {
        Pool::new(
            id,
            PoolAsset::new(a.0, Decimal::from(a.1)),
            PoolAsset::new(b.0, Decimal::from(b.1)),
            fee,
        )
        .unwrap()
    }

    fn reference_router() -> AmmRouter {
        AmmRouter::new(PoolSnapshot::new(vec![
            pool(1, ("assetA", 1_000_000), ("assetB", 2_000_000), Decimal::new(2, 3)),
            pool(2, ("assetB", 500_000), ("assetC", 500_000), Decimal::new(1, 3)),
        ]))
    }

    fn mesh_router() -> AmmRouter {
        AmmRouter::new(PoolSnapshot::new(vec![
            pool(1, ("uosmo", 1_000_000), ("uatom", 100_000), Decimal::new(2, 3)),
            pool(2, ("uatom", 200_000), ("uusdc", 2_000_000), Decimal::new(2, 3)),
            pool(3, ("uusdc", 5_000_000), ("uosmo", 500_000), Decimal::new(3, 3)),
            pool(4, ("uosmo", 800_000), ("uatom", 80_000), Decimal::new(1, 3)),
            pool(5, ("uion", 10_000), ("uusdc", 30_000), Decimal::new(2, 3)),
        ]))
    }

    fn assert_well_formed(routes: &[Route], token_in: &str, token_out: &str) {
        for route in routes {
            assert_eq!(route.token_in(), token_in);
            assert_eq!(route.token_out(), token_out);
            for pair in route.hops().windows(2) {
                assert_eq!(pair[0].token_out_denom, pair[1].token_in_denom);
            }
            let ids: HashSet<u64> = route.pool_ids().collect();
            assert_eq!(ids.len(), route.len(), "pool reused in {:?}", route);
        }
    }

    #[test]
    fn test_reference_two_hop_route() {
        let router = reference_router();
        let routes = router.get_routes("assetA", "assetC");

        assert_eq!(routes.len(), 1);
        let route = &routes[0];
        assert_eq!(route.len(), 2);
        assert_eq!(route.hops()[0].token_out_denom, "assetB");
        assert_eq!(route.hops()[0].x1, Decimal::from(1_000_000));
        assert_eq!(route.hops()[0].y1, Decimal::from(2_000_000));
        assert_eq!(route.hops()[1].x1, Decimal::from(500_000));
        assert_eq!(route.hops()[1].y1, Decimal::from(500_000));
    }

    #[test]
    fn test_reference_estimated_output() {
        let router = reference_router();
        let route = &router.get_routes("assetA", "assetC")[0];
        let output = router.get_estimated_output(Decimal::from(1000), route).unwrap();

        // Hop by hop: constant product, then fee on the hop output
        let hop1 = Decimal::from(2_000_000) * Decimal::from(1000) / Decimal::from(1_001_000);
        let hop1 = hop1 * (Decimal::ONE - Decimal::new(2, 3));
        let hop2 = Decimal::from(500_000) * hop1 / (Decimal::from(500_000) + hop1);
        let hop2 = hop2 * (Decimal::ONE - Decimal::new(1, 3));

        assert_eq!(output, hop2);
        assert!(output > Decimal::new(198409, 2) && output < Decimal::new(198411, 2), "{output}");
    }

    #[test]
    fn test_routes_are_well_formed_and_simple() {
        let router = mesh_router();
        for (a, b) in [("uosmo", "uusdc"), ("uion", "uatom"), ("uatom", "uosmo")] {
            let routes = router.get_routes(a, b);
            assert!(!routes.is_empty(), "{a} -> {b}");
            assert_well_formed(&routes, a, b);
        }
    }

    #[test]
    fn test_junction_pool_yields_short_and_long_paths() {
        let router = mesh_router();
        let routes = router.get_routes("uosmo", "uusdc");

        // direct through pool 3
        assert!(routes.iter().any(|r| r.len() == 1 && r.hops()[0].pool_id == 3));
        // via atom through pool 1 then 2
        assert!(routes
            .iter()
            .any(|r| r.pool_ids().collect::<Vec<_>>() == vec![1, 2]));
        // pool 1 -> pool 4 back to osmo, then pool 3
        assert!(routes
            .iter()
            .any(|r| r.pool_ids().collect::<Vec<_>>() == vec![1, 4, 3]));
    }

    #[test]
    fn test_unknown_denom_has_no_routes() {
        let router = mesh_router();
        assert!(router.get_routes("uxyz", "uusdc").is_empty());
        assert!(router.get_routes("uosmo", "uxyz").is_empty());
    }

    #[test]
    fn test_untradable_pool_skipped() {
        let router = AmmRouter::new(PoolSnapshot::new(vec![pool(
            1,
            ("a", 0),
            ("b", 100),
            Decimal::ZERO,
        )]));
        assert!(router.get_routes("a", "b").is_empty());
    }

    #[test]
    fn test_route_search_is_deterministic() {
        let router = mesh_router();
        let first = router.get_routes("uion", "uosmo");
        let second = router.get_routes("uion", "uosmo");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_zero_amount_is_invalid_input() {
        let router = reference_router();
        let route = &router.get_routes("assetA", "assetC")[0];
        assert!(matches!(
            router.get_estimated_output(Decimal::ZERO, route),
            Err(RouteError::InvalidInput(_))
        ));
        assert!(matches!(
            router.get_estimated_required_input(Decimal::ZERO, route),
            Err(RouteError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fee_never_increases_output() {
        let router = mesh_router();
        for route in router.get_routes("uosmo", "uusdc") {
            let zero_fee = Route::new(
                route
                    .hops()
                    .iter()
                    .cloned()
                    .map(|hop| RouteHop { swap_fee: Decimal::ZERO, ..hop })
                    .collect(),
            )
            .unwrap();
            let amount = Decimal::from(12_345);
            let with_fee = route.estimated_output(amount).unwrap();
            let without_fee = zero_fee.estimated_output(amount).unwrap();
            assert!(with_fee <= without_fee);
        }
    }

    #[test]
    fn test_required_input_inverts_output() {
        let router = AmmRouter::new(PoolSnapshot::new(vec![pool(
            9,
            ("uosmo", 7_000_000),
            ("uusdc", 3_000_000),
            Decimal::ZERO,
        )]));
        let route = &router.get_routes("uosmo", "uusdc")[0];
        let amount_in = Decimal::from(25_000);

        let out = router.get_estimated_output(amount_in, route).unwrap();
        let back = router.get_estimated_required_input(out, route).unwrap();
        let tolerance = Decimal::new(1, 10);
        assert!((back - amount_in).abs() < tolerance, "{back} vs {amount_in}");
    }

    #[test]
    fn test_required_input_fee_on_target() {
        let hop = RouteHop {
            pool_id: 1,
            token_in_denom: "a".into(),
            token_out_denom: "b".into(),
            swap_fee: Decimal::new(1, 2),
            x1: Decimal::from(1000),
            y1: Decimal::from(1000),
        };
        // dx = 1000 * 500 / 500 = 1000; fee = 500 * 0.01 = 5
        assert_eq!(hop.input_for(Decimal::from(500)).unwrap(), Decimal::from(1005));
    }

    #[test]
    fn test_insufficient_liquidity() {
        let router = reference_router();
        let route = &router.get_routes("assetA", "assetC")[0];
        let err = router
            .get_estimated_required_input(Decimal::from(2_000_000), route)
            .unwrap_err();
        assert_eq!(
            err,
            RouteError::InsufficientLiquidity {
                pool_id: 1,
                denom: "assetB".into(),
                requested: Decimal::from(2_000_000),
                reserve: Decimal::from(2_000_000),
            }
        );
    }

    #[test]
    fn test_route_new_rejects_broken_chain() {
        let hop = |from: &str, to: &str| RouteHop {
            pool_id: 1,
            token_in_denom: from.into(),
            token_out_denom: to.into(),
            swap_fee: Decimal::ZERO,
            x1: Decimal::ONE,
            y1: Decimal::ONE,
        };
        assert!(Route::new(vec![]).is_none());
        assert!(Route::new(vec![hop("a", "b"), hop("c", "d")]).is_none());
        assert!(Route::new(vec![hop("a", "b"), hop("b", "c")]).is_some());
    }
}
