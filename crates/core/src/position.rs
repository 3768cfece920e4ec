//! Borrow positions and the price table they are valued against.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

use crate::amount;

/// An amount of one denom held as collateral or owed as debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub denom: String,
    pub amount: Decimal,
}

impl AssetAmount {
    pub fn new(denom: impl Into<String>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// Quote value at the table price; an unpriced denom is worth zero.
    pub fn value(&self, prices: &PriceTable) -> Decimal {
        prices
            .get(&self.denom)
            .map(|price| amount::value_of(self.amount, price))
            .unwrap_or(Decimal::ZERO)
    }
}

/// Collateral deposited by a borrower.
pub type Collateral = AssetAmount;

/// Debt owed by a borrower.
pub type Debt = AssetAmount;

/// A borrower's position as supplied by the position source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Borrower address
    pub address: String,
    /// Collateral entries
    pub collaterals: SmallVec<[Collateral; 4]>,
    /// Debt entries
    pub debts: SmallVec<[Debt; 4]>,
}

impl Position {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            collaterals: SmallVec::new(),
            debts: SmallVec::new(),
        }
    }

    pub fn with_collateral(mut self, denom: impl Into<String>, amount: Decimal) -> Self {
        self.collaterals.push(AssetAmount::new(denom, amount));
        self
    }

    pub fn with_debt(mut self, denom: impl Into<String>, amount: Decimal) -> Self {
        self.debts.push(AssetAmount::new(denom, amount));
        self
    }

    /// Whether the position has something to seize and something to repay.
    pub fn is_liquidatable_shape(&self) -> bool {
        !self.collaterals.is_empty() && !self.debts.is_empty()
    }

    /// Get the largest collateral by quote value. Ties keep the first entry.
    pub fn largest_collateral(&self, prices: &PriceTable) -> Option<&Collateral> {
        largest_by_value(&self.collaterals, prices)
    }

    /// Get the largest debt by quote value. Ties keep the first entry.
    pub fn largest_debt(&self, prices: &PriceTable) -> Option<&Debt> {
        largest_by_value(&self.debts, prices)
    }

    /// Total debt value at table prices.
    pub fn total_debt_value(&self, prices: &PriceTable) -> Decimal {
        self.debts.iter().map(|d| d.value(prices)).fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Total collateral value at table prices.
    pub fn total_collateral_value(&self, prices: &PriceTable) -> Decimal {
        self.collaterals.iter().map(|c| c.value(prices)).fold(Decimal::ZERO, Decimal::saturating_add)
    }
}

fn largest_by_value<'a>(entries: &'a [AssetAmount], prices: &PriceTable) -> Option<&'a AssetAmount> {
    let mut best: Option<(&AssetAmount, Decimal)> = None;
    for entry in entries {
        let value = entry.value(prices);
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((entry, value)),
        }
    }
    best.map(|(entry, _)| entry)
}

/// Unit prices per denom in a common quote unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    prices: HashMap<String, Decimal>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, denom: impl Into<String>, price: Decimal) {
        self.prices.insert(denom.into(), price);
    }

    pub fn with_price(mut self, denom: impl Into<String>, price: Decimal) -> Self {
        self.insert(denom, price);
        self
    }

    pub fn get(&self, denom: &str) -> Option<Decimal> {
        self.prices.get(denom).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, Decimal)> for PriceTable {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}
