//! Repay planning against expected swap proceeds.

use rust_decimal::Decimal;
use tracing::debug;

use crate::messages::{self, Coin, ProtocolMsg};
use crate::sizer::DenomAmounts;

/// Caps each repay by what the debt swaps are expected to deliver.
#[derive(Debug, Clone, Copy)]
pub struct RepayPlanner {
    dust_threshold: Decimal,
}

impl RepayPlanner {
    pub fn new(dust_threshold: Decimal) -> Self {
        Self { dust_threshold }
    }

    /// Amount to repay for one denom: min(requested, expected), or `None`
    /// when that is at or below dust.
    pub fn repay_amount(&self, requested: Decimal, expected: Option<Decimal>) -> Option<Decimal> {
        let repay = requested.min(expected.unwrap_or(Decimal::ZERO));
        (repay > self.dust_threshold).then_some(repay)
    }

    /// One Red Bank repay message per debt denom worth repaying, in debt order.
    pub fn plan(
        &self,
        sender: &str,
        redbank: &str,
        debts: &DenomAmounts,
        expected: &DenomAmounts,
    ) -> Vec<ProtocolMsg> {
        debts
            .iter()
            .filter_map(|(denom, requested)| {
                let Some(repay) = self.repay_amount(requested, expected.get(denom)) else {
                    debug!(denom = %denom, requested = %requested, "Repay below dust, omitted");
                    return None;
                };
                Some(messages::make_repay_msg(sender, vec![Coin::new(denom, repay)], redbank))
            })
            .collect()
    }
}
