//! Liquidator core logic.
//!
//! This crate provides the Red Bank liquidation engine:
//! - AMM router: simple-path discovery and exact constant-product pricing
//! - Route selection over fully evaluated candidates
//! - Capital-bounded liquidation sizing
//! - Swap planning (collateral to neutral, neutral to debt) and repay planning
//! - Cycle executor with a retrying service loop
//!
//! Chain access is abstracted behind the traits in [`source`].

pub mod amount;
pub mod config;
mod executor;
pub mod messages;
mod pool;
mod position;
mod repay_planner;
mod retry;
mod router;
mod selector;
mod sizer;
pub mod source;
mod swap_planner;

pub use config::{BotConfig, ConfigError, CycleConfig, PlannerConfig, RetryConfig};
pub use executor::{
    Collaborators, CycleReport, FundingMode, LiquidationExecutor, ProtocolAddresses, SubmittedBatch,
};
pub use messages::{Coin, Event, LiquidationResult, ProtocolMsg};
pub use pool::{Pool, PoolAsset, PoolError, PoolSnapshot};
pub use position::{AssetAmount, Collateral, Debt, Position, PriceTable};
pub use repay_planner::RepayPlanner;
pub use retry::RetryPolicy;
pub use router::{AmmRouter, Route, RouteError, RouteHop};
pub use selector::{RequiredInputSelection, RouteQuote, RouteSelector};
pub use sizer::{
    BudgetAccumulator, DenomAmounts, LiquidationSizer, LiquidationTx, SizingOutcome, SkipReason,
    SkippedPosition, DEFAULT_MIN_LIQUIDATION_VALUE,
};
pub use source::{BalanceSource, BroadcastResult, PoolSource, PositionSource, PriceSource, TxSubmitter};
pub use swap_planner::{DebtSwapPlan, NeutralSwapPlan, SwapInputPolicy, SwapPlanner};
