//! Swap planning for a liquidation cycle.
//!
//! Phase A sells won collateral into the neutral asset. Phase B buys each
//! owed debt asset with neutral, drawing down a running neutral balance in
//! the order the sizer first saw each debt denom.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::amount;
use crate::config::PlannerConfig;
use crate::messages::{self, Coin, ProtocolMsg};
use crate::router::{AmmRouter, RouteError};
use crate::selector::RouteSelector;
use crate::sizer::DenomAmounts;

/// Which amount a Phase B swap declares as its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapInputPolicy {
    /// Declare the amount actually budgeted (capped by remaining neutral).
    #[default]
    Capped,
    /// Declare the full required-input estimate even when it exceeds the
    /// remaining neutral balance.
    Uncapped,
}

/// Phase A output.
#[derive(Debug, Clone, Default)]
pub struct NeutralSwapPlan {
    pub msgs: Vec<ProtocolMsg>,
    /// Sum of pre-slippage output estimates
    pub expected_neutral: Decimal,
}

/// Phase B output.
#[derive(Debug, Clone, Default)]
pub struct DebtSwapPlan {
    pub msgs: Vec<ProtocolMsg>,
    /// Expected post-swap amount per debt denom
    pub expected: DenomAmounts,
    pub remaining_neutral: Decimal,
}

impl DebtSwapPlan {
    /// Expected proceeds as coins to attach to a liquidation.
    pub fn expected_coins(&self) -> Vec<Coin> {
        self.expected.to_coins()
    }
}

pub struct SwapPlanner<'a> {
    selector: RouteSelector<'a>,
    config: &'a PlannerConfig,
}

impl<'a> SwapPlanner<'a> {
    pub fn new(router: &'a AmmRouter, config: &'a PlannerConfig) -> Self {
        Self {
            selector: RouteSelector::new(router, config.required_input),
            config,
        }
    }

    /// Phase A: one max-output swap per spendable non-neutral coin.
    pub fn plan_to_neutral(&self, sender: &str, coins: &[Coin]) -> NeutralSwapPlan {
        let neutral = self.config.neutral_denom.as_str();
        let mut plan = NeutralSwapPlan::default();

        for coin in coins.iter().filter(|c| c.denom != neutral) {
            let Some(mut spendable) = coin.decimal_amount() else {
                debug!(denom = %coin.denom, amount = %coin.amount, "Skipping non-numeric amount");
                continue;
            };
            if coin.denom == self.config.gas_denom {
                spendable -= self.config.gas_reserve;
            }
            if spendable <= self.config.dust_threshold {
                continue;
            }

            let quote = match self.selector.best_output(&coin.denom, neutral, spendable) {
                Ok(quote) => quote,
                Err(e) => {
                    log_route_error(&e, &coin.denom, neutral);
                    continue;
                }
            };

            let Some(min_output) = amount::apply_discount(quote.amount, self.config.collateral_slippage) else {
                warn!(denom = %coin.denom, estimate = %quote.amount, "Slippage bound overflows, skipping swap");
                continue;
            };
            let min_output = min_output.floor();
            plan.expected_neutral += quote.amount;
            plan.msgs.push(messages::make_swap_msg(
                sender,
                &quote.route,
                Coin::new(coin.denom.clone(), spendable),
                min_output,
            ));

            debug!(
                denom = %coin.denom,
                amount_in = %spendable,
                estimate = %quote.amount,
                hops = quote.route.len(),
                "Planned swap to neutral"
            );
        }

        plan
    }

    /// Phase B: buy each debt denom with neutral, capped by `neutral_available`.
    pub fn plan_to_debts(&self, sender: &str, debts: &DenomAmounts, neutral_available: Decimal) -> DebtSwapPlan {
        let neutral = self.config.neutral_denom.as_str();
        let mut remaining = neutral_available;
        let mut msgs = Vec::new();
        let mut expected = DenomAmounts::new();

        for (denom, debt) in debts.iter() {
            if debt <= self.config.dust_threshold {
                continue;
            }

            if denom == neutral {
                let capped = remaining.min(debt);
                if capped <= Decimal::ZERO {
                    warn!(denom = %denom, "No neutral left for debt");
                    continue;
                }
                remaining -= capped - Decimal::ONE;
                expected.add(denom, capped);
                continue;
            }

            let Some(target) = amount::apply_premium(debt, self.config.debt_buffer) else {
                warn!(denom = %denom, debt = %debt, "Buffered debt overflows, skipping swap");
                continue;
            };
            let quote = match self.selector.best_required_input(neutral, denom, target) {
                Ok(quote) => quote,
                Err(e) => {
                    log_route_error(&e, neutral, denom);
                    continue;
                }
            };
            let amount_to_swap = quote.amount;
            let capped = amount_to_swap.min(remaining);
            if amount::floor_amount(capped).is_zero() {
                warn!(denom = %denom, required = %amount_to_swap, "No neutral left for debt swap");
                continue;
            }

            let min_debt_output = match self.selector.router().get_estimated_output(capped, &quote.route) {
                Ok(out) => match amount::apply_discount(out, self.config.debt_slippage) {
                    Some(min) => min,
                    None => {
                        warn!(denom = %denom, estimate = %out, "Slippage bound overflows, skipping swap");
                        continue;
                    }
                },
                Err(e) => {
                    log_route_error(&e, neutral, denom);
                    continue;
                }
            };

            remaining -= capped - Decimal::ONE;
            expected.add(denom, min_debt_output);

            let declared = match self.config.swap_input {
                SwapInputPolicy::Capped => capped,
                SwapInputPolicy::Uncapped => amount_to_swap,
            };
            msgs.push(messages::make_swap_msg(
                sender,
                &quote.route,
                Coin::new(neutral, declared),
                min_debt_output,
            ));

            debug!(
                denom = %denom,
                debt = %debt,
                required = %amount_to_swap,
                budgeted = %capped,
                min_out = %min_debt_output,
                "Planned swap to debt"
            );
        }

        DebtSwapPlan {
            msgs,
            expected,
            remaining_neutral: remaining,
        }
    }
}

fn log_route_error(err: &RouteError, token_in: &str, token_out: &str) {
    match err {
        RouteError::NoRouteFound { .. } => {
            info!(token_in, token_out, "No route found, skipping swap")
        }
        _ => warn!(token_in, token_out, error = %err, "Swap could not be priced, skipping"),
    }
}
