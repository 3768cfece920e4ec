//! Liquidation sizing under a capital budget.
//!
//! Positions are processed in the order they arrive. Earlier positions are
//! serviced first when capital runs short, so the input order is part of the
//! result.

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::amount;
use crate::messages::Coin;
use crate::position::{Position, PriceTable};

/// Remaining capital at or below this value stops new liquidations.
pub const DEFAULT_MIN_LIQUIDATION_VALUE: Decimal = Decimal::ONE_HUNDRED;

/// One element of the filterer's `liquidate_many` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationTx {
    pub collateral_denom: String,
    pub debt_denom: String,
    pub user_address: String,
    /// Debt units to repay
    #[serde(serialize_with = "chain_amount")]
    pub amount: Decimal,
}

fn chain_amount<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&amount::to_chain_amount(*value))
}

/// Insertion-ordered denom -> amount aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenomAmounts {
    entries: SmallVec<[(String, Decimal); 4]>,
}

impl DenomAmounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the entry for `denom`, creating it at the end if new.
    pub fn add(&mut self, denom: &str, value: Decimal) {
        match self.entries.iter_mut().find(|(d, _)| d == denom) {
            Some((_, existing)) => *existing += value,
            None => self.entries.push((denom.to_string(), value)),
        }
    }

    pub fn get(&self, denom: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|(d, _)| d == denom)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> + '_ {
        self.entries.iter().map(|(d, v)| (d.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Floored coins in insertion order. Entries that floor to zero are dropped.
    pub fn to_coins(&self) -> Vec<Coin> {
        self.iter()
            .filter(|(_, v)| amount::floor_amount(*v) > Decimal::ZERO)
            .map(|(denom, v)| Coin::new(denom, v))
            .collect()
    }
}

impl<'a> FromIterator<(&'a str, Decimal)> for DenomAmounts {
    fn from_iter<I: IntoIterator<Item = (&'a str, Decimal)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (denom, value) in iter {
            out.add(denom, value);
        }
        out
    }
}

/// Running state for one sizing pass.
#[derive(Debug, Clone, Default)]
pub struct BudgetAccumulator {
    /// Quote value committed so far
    pub committed: Decimal,
    /// Aggregate debt to repay per denom
    pub debts: DenomAmounts,
}

impl BudgetAccumulator {
    pub fn remaining(&self, available_value: Decimal) -> Decimal {
        available_value - self.committed
    }

    fn commit(&mut self, tx: &LiquidationTx, debt_price: Decimal) {
        self.committed = self.committed.saturating_add(amount::value_of(tx.amount, debt_price));
        self.debts.add(&tx.debt_denom, tx.amount);
    }
}

/// Why a position produced no liquidation this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Remaining capital at or below the minimum liquidation value
    CapitalExhausted { remaining: Decimal },
    /// The selected debt has no usable price
    MissingPrice { denom: String },
    /// The computed liquidation amount floored to zero
    ZeroAmount,
    /// No collateral or no debt
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPosition {
    pub address: String,
    pub reason: SkipReason,
}

/// Result of a sizing pass.
#[derive(Debug, Clone, Default)]
pub struct SizingOutcome {
    /// Liquidations in position order
    pub txs: Vec<LiquidationTx>,
    /// Aggregate debt per denom, first-seen order
    pub debts: DenomAmounts,
    /// Total quote value committed
    pub committed: Decimal,
    pub skipped: Vec<SkippedPosition>,
}

/// Picks one collateral/debt pair per position and sizes it against capital.
#[derive(Debug, Clone, Copy)]
pub struct LiquidationSizer {
    min_liquidation_value: Decimal,
}

impl Default for LiquidationSizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LIQUIDATION_VALUE)
    }
}

impl LiquidationSizer {
    pub fn new(min_liquidation_value: Decimal) -> Self {
        Self {
            min_liquidation_value,
        }
    }

    /// Size liquidations for `positions` given `available_value` of capital.
    pub fn size(
        &self,
        positions: &[Position],
        prices: &PriceTable,
        available_value: Decimal,
    ) -> SizingOutcome {
        let mut acc = BudgetAccumulator::default();
        let mut txs = Vec::with_capacity(positions.len());
        let mut skipped = Vec::new();

        for position in positions {
            match self.size_position(position, prices, available_value, &mut acc) {
                Ok(tx) => txs.push(tx),
                Err(reason) => skipped.push(SkippedPosition {
                    address: position.address.clone(),
                    reason,
                }),
            }
        }

        debug!(
            txs = txs.len(),
            skipped = skipped.len(),
            committed = %acc.committed,
            available = %available_value,
            "Sizing complete"
        );

        SizingOutcome {
            txs,
            debts: acc.debts,
            committed: acc.committed,
            skipped,
        }
    }

    /// Size a single position, committing it to `acc` on success.
    pub fn size_position(
        &self,
        position: &Position,
        prices: &PriceTable,
        available_value: Decimal,
        acc: &mut BudgetAccumulator,
    ) -> Result<LiquidationTx, SkipReason> {
        let (Some(collateral), Some(debt)) = (
            position.largest_collateral(prices),
            position.largest_debt(prices),
        ) else {
            return Err(SkipReason::Empty);
        };

        let remaining = acc.remaining(available_value);
        if remaining <= self.min_liquidation_value {
            warn!(
                user = %position.address,
                remaining = %remaining,
                "Not enough capital to liquidate position"
            );
            return Err(SkipReason::CapitalExhausted { remaining });
        }

        let debt_price = match prices.get(&debt.denom) {
            Some(price) if price > Decimal::ZERO => price,
            _ => {
                warn!(user = %position.address, denom = %debt.denom, "Debt has no price, skipping");
                return Err(SkipReason::MissingPrice {
                    denom: debt.denom.clone(),
                });
            }
        };

        let debt_value = amount::value_of(debt.amount, debt_price);
        let amount = if remaining > debt_value {
            debt.amount
        } else {
            remaining
                .checked_div(debt_price)
                .unwrap_or(debt.amount)
                .floor()
                .min(debt.amount)
        };
        if amount <= Decimal::ZERO {
            debug!(user = %position.address, "Liquidation amount is zero, skipping");
            return Err(SkipReason::ZeroAmount);
        }

        let tx = LiquidationTx {
            collateral_denom: collateral.denom.clone(),
            debt_denom: debt.denom.clone(),
            user_address: position.address.clone(),
            amount,
        };
        acc.commit(&tx, debt_price);

        debug!(
            user = %tx.user_address,
            collateral = %tx.collateral_denom,
            debt = %tx.debt_denom,
            amount = %tx.amount,
            "Sized liquidation"
        );
        Ok(tx)
    }
}
