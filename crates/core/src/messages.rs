//! Instruction objects handed to the submission layer, plus the
//! broadcast-result parsing that feeds liquidation reporting.
//!
//! Contract-bound messages carry their execute body as JSON; amounts are
//! floored integer strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::amount;
use crate::router::Route;
use crate::sizer::{DenomAmounts, LiquidationTx};

/// A denom and an integer amount, as it appears on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    /// Build a coin, flooring `value` to whole base units.
    pub fn new(denom: impl Into<String>, value: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount: amount::to_chain_amount(value),
        }
    }

    /// Parsed amount; `None` when the chain string is not a number.
    pub fn decimal_amount(&self) -> Option<Decimal> {
        amount::parse_amount(&self.amount)
    }
}

/// One leg of an exact-amount-in swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapAmountInRoute {
    pub pool_id: u64,
    pub token_out_denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapExactAmountIn {
    pub sender: String,
    pub routes: Vec<SwapAmountInRoute>,
    pub token_in: Coin,
    pub token_out_min_amount: String,
}

/// A wasm contract execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub sender: String,
    pub contract: String,
    pub msg: Value,
    pub funds: Vec<Coin>,
}

/// Everything the planners can ask the submitter to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProtocolMsg {
    Swap(SwapExactAmountIn),
    Borrow(ContractCall),
    Withdraw(ContractCall),
    Deposit(ContractCall),
    Repay(ContractCall),
    Execute(ContractCall),
}

impl ProtocolMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolMsg::Swap(_) => "swap",
            ProtocolMsg::Borrow(_) => "borrow",
            ProtocolMsg::Withdraw(_) => "withdraw",
            ProtocolMsg::Deposit(_) => "deposit",
            ProtocolMsg::Repay(_) => "repay",
            ProtocolMsg::Execute(_) => "execute",
        }
    }

    pub fn as_swap(&self) -> Option<&SwapExactAmountIn> {
        match self {
            ProtocolMsg::Swap(swap) => Some(swap),
            _ => None,
        }
    }

    pub fn as_contract_call(&self) -> Option<&ContractCall> {
        match self {
            ProtocolMsg::Swap(_) => None,
            ProtocolMsg::Borrow(call)
            | ProtocolMsg::Withdraw(call)
            | ProtocolMsg::Deposit(call)
            | ProtocolMsg::Repay(call)
            | ProtocolMsg::Execute(call) => Some(call),
        }
    }
}

pub fn make_swap_msg(sender: &str, route: &Route, token_in: Coin, token_out_min: Decimal) -> ProtocolMsg {
    ProtocolMsg::Swap(SwapExactAmountIn {
        sender: sender.to_string(),
        routes: route
            .hops()
            .iter()
            .map(|hop| SwapAmountInRoute {
                pool_id: hop.pool_id,
                token_out_denom: hop.token_out_denom.clone(),
            })
            .collect(),
        token_in,
        token_out_min_amount: amount::to_chain_amount(token_out_min),
    })
}

fn contract_call(sender: &str, contract: &str, msg: Value, funds: Vec<Coin>) -> ContractCall {
    ContractCall {
        sender: sender.to_string(),
        contract: contract.to_string(),
        msg,
        funds,
    }
}

pub fn make_borrow_msg(sender: &str, denom: &str, value: Decimal, redbank: &str) -> ProtocolMsg {
    let msg = json!({ "borrow": { "denom": denom, "amount": amount::to_chain_amount(value) } });
    ProtocolMsg::Borrow(contract_call(sender, redbank, msg, Vec::new()))
}

pub fn make_withdraw_msg(sender: &str, denom: &str, redbank: &str) -> ProtocolMsg {
    let msg = json!({ "withdraw": { "denom": denom } });
    ProtocolMsg::Withdraw(contract_call(sender, redbank, msg, Vec::new()))
}

pub fn make_deposit_msg(sender: &str, coin: Coin, redbank: &str) -> ProtocolMsg {
    ProtocolMsg::Deposit(contract_call(sender, redbank, json!({ "deposit": {} }), vec![coin]))
}

pub fn make_repay_msg(sender: &str, coins: Vec<Coin>, redbank: &str) -> ProtocolMsg {
    ProtocolMsg::Repay(contract_call(sender, redbank, json!({ "repay": {} }), coins))
}

/// The filterer's `liquidate_many` execution with `funds` attached.
pub fn make_liquidate_many_msg(
    sender: &str,
    filterer: &str,
    txs: &[LiquidationTx],
    funds: Vec<Coin>,
) -> ProtocolMsg {
    let msg = json!({ "liquidate_many": { "liquidations": txs } });
    ProtocolMsg::Execute(contract_call(sender, filterer, msg, funds))
}

/// Merge Red Bank collaterals with wallet balances, summing per denom.
///
/// Output keeps first-seen order (collaterals first). Unparseable amounts count as zero.
pub fn combine_balances(collaterals: &[Coin], balances: &[Coin]) -> Vec<Coin> {
    let merged: DenomAmounts = collaterals
        .iter()
        .chain(balances)
        .map(|coin| (coin.denom.as_str(), coin.decimal_amount().unwrap_or(Decimal::ZERO)))
        .collect();
    merged
        .iter()
        .map(|(denom, value)| Coin::new(denom, value))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// A transaction event as returned in a broadcast log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

/// One liquidation reported by the filterer contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub collateral_denom: String,
    pub collateral_amount: String,
    pub debt_denom: String,
    pub debt_amount: String,
}

/// Extract liquidation records from `wasm` events.
///
/// Attributes are read in order; `debt_amount` is the last key of a record
/// and closes it.
pub fn parse_liquidation_results(events: &[Event]) -> Vec<LiquidationResult> {
    let mut results = Vec::new();
    for event in events.iter().filter(|e| e.kind == "wasm") {
        let mut current = LiquidationResult::default();
        for attr in &event.attributes {
            match attr.key.as_str() {
                "collateral_denom" => current.collateral_denom = attr.value.clone(),
                "collateral_amount" => current.collateral_amount = attr.value.clone(),
                "debt_denom" => current.debt_denom = attr.value.clone(),
                "debt_amount" => {
                    current.debt_amount = attr.value.clone();
                    results.push(std::mem::take(&mut current));
                }
                _ => {}
            }
        }
    }
    results
}
