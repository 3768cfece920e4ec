//! Route selection over fully evaluated candidate sets.
//!
//! Every candidate route is priced; nothing is pruned. Ranking uses a stable
//! ascending sort so that ties resolve by the router's discovery order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::router::{AmmRouter, Route, RouteError};

/// How the required-input ranking picks its winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredInputSelection {
    /// Cheapest route; the earliest candidate wins a tie.
    #[default]
    Minimum,
    /// Ascending sort then take the last element, i.e. the most expensive
    /// route. Kept for compatibility with earlier deployments.
    LegacyLast,
}

/// A selected route together with the estimate it was ranked by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteQuote {
    pub route: Route,
    /// Estimated output (max-output selection) or required input
    pub amount: Decimal,
}

/// Picks extremal routes for a desired swap.
#[derive(Debug, Clone, Copy)]
pub struct RouteSelector<'a> {
    router: &'a AmmRouter,
    required_input: RequiredInputSelection,
}

impl<'a> RouteSelector<'a> {
    pub fn new(router: &'a AmmRouter, required_input: RequiredInputSelection) -> Self {
        Self {
            router,
            required_input,
        }
    }

    pub fn router(&self) -> &'a AmmRouter {
        self.router
    }

    /// Route from `token_in` to `token_out` maximizing output for `amount_in`.
    pub fn best_output(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
    ) -> Result<RouteQuote, RouteError> {
        if amount_in <= Decimal::ZERO {
            return Err(RouteError::InvalidInput("cannot use token in amount of 0"));
        }
        let routes = self.router.get_routes(token_in, token_out);
        let quotes = self.evaluate(routes, |route| {
            self.router.get_estimated_output(amount_in, route)
        });
        select_last(quotes).ok_or_else(|| no_route(token_in, token_out))
    }

    /// Route from `token_in` to `token_out` ranked by the input needed to
    /// receive `amount_out`, using the configured selection policy.
    pub fn best_required_input(
        &self,
        token_in: &str,
        token_out: &str,
        amount_out: Decimal,
    ) -> Result<RouteQuote, RouteError> {
        if amount_out <= Decimal::ZERO {
            return Err(RouteError::InvalidInput("cannot use token out amount of 0"));
        }
        let routes = self.router.get_routes(token_in, token_out);
        let quotes = self.evaluate(routes, |route| {
            self.router.get_estimated_required_input(amount_out, route)
        });
        let selected = match self.required_input {
            RequiredInputSelection::Minimum => select_first_min(quotes),
            RequiredInputSelection::LegacyLast => select_last(quotes),
        };
        selected.ok_or_else(|| no_route(token_in, token_out))
    }

    fn evaluate<F>(&self, routes: Vec<Route>, estimate: F) -> Vec<RouteQuote>
    where
        F: Fn(&Route) -> Result<Decimal, RouteError>,
    {
        let candidates = routes.len();
        let quotes: Vec<RouteQuote> = routes
            .into_iter()
            .filter_map(|route| match estimate(&route) {
                Ok(amount) => Some(RouteQuote { route, amount }),
                Err(e) => {
                    trace!(error = %e, hops = route.len(), "Dropping route candidate");
                    None
                }
            })
            .collect();
        debug!(candidates, priced = quotes.len(), "Evaluated route candidates");
        quotes
    }
}

fn no_route(token_in: &str, token_out: &str) -> RouteError {
    RouteError::NoRouteFound {
        token_in: token_in.to_string(),
        token_out: token_out.to_string(),
    }
}

/// Stable ascending sort, take the last element (last among equals).
fn select_last(mut quotes: Vec<RouteQuote>) -> Option<RouteQuote> {
    quotes.sort_by(|a, b| a.amount.cmp(&b.amount));
    quotes.pop()
}

/// Smallest amount, earliest among equals.
fn select_first_min(quotes: Vec<RouteQuote>) -> Option<RouteQuote> {
    quotes.into_iter().min_by(|a, b| a.amount.cmp(&b.amount))
}
