//! Cycle executor: refresh, size, plan and submit one liquidation cycle.
//!
//! Each cycle reads a fresh snapshot of pools, prices and balances, pops a
//! bounded batch of positions, then hands planned message batches to the
//! submitter. Planning never sees data change mid-pass. Failed cycles are
//! retried by [`LiquidationExecutor::run`] under a [`RetryPolicy`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::config::BotConfig;
use crate::messages::{self, Coin, LiquidationResult, ProtocolMsg};
use crate::pool::PoolSnapshot;
use crate::position::PriceTable;
use crate::repay_planner::RepayPlanner;
use crate::retry::RetryPolicy;
use crate::router::AmmRouter;
use crate::sizer::{LiquidationSizer, LiquidationTx, SizingOutcome, SkippedPosition};
use crate::source::{BalanceSource, BroadcastResult, PoolSource, PositionSource, PriceSource, TxSubmitter};
use crate::swap_planner::SwapPlanner;

/// How the debt assets for a liquidation batch are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingMode {
    /// Swap neutral into each debt asset before liquidating.
    #[default]
    Swap,
    /// Borrow each debt asset from Red Bank, liquidate, then swap and repay.
    Borrow,
}

/// Contract and account addresses the executor works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolAddresses {
    /// Account that signs and receives
    pub liquidator: String,
    pub redbank: String,
    /// Contract accepting `liquidate_many`
    pub filterer: String,
}

/// The executor's external collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub pools: Arc<dyn PoolSource>,
    pub prices: Arc<dyn PriceSource>,
    pub balances: Arc<dyn BalanceSource>,
    pub positions: Arc<dyn PositionSource>,
    pub submitter: Arc<dyn TxSubmitter>,
}

/// A batch handed to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBatch {
    pub label: &'static str,
    pub msgs: usize,
    pub height: u64,
}

/// Summary of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Positions popped from the source
    pub positions: usize,
    pub txs: Vec<LiquidationTx>,
    pub skipped: Vec<SkippedPosition>,
    /// Quote value committed by sizing
    pub committed: Decimal,
    pub batches: Vec<SubmittedBatch>,
    /// Liquidations reported by the filterer
    pub liquidations: Vec<LiquidationResult>,
}

impl CycleReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            positions: 0,
            txs: Vec::new(),
            skipped: Vec::new(),
            committed: Decimal::ZERO,
            batches: Vec::new(),
            liquidations: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// Nothing was queued this cycle.
    pub fn is_idle(&self) -> bool {
        self.positions == 0
    }

    pub fn msg_count(&self) -> usize {
        self.batches.iter().map(|b| b.msgs).sum()
    }
}

/// Data read once at the start of a cycle.
struct CycleSnapshot {
    router: AmmRouter,
    prices: PriceTable,
    balances: Vec<Coin>,
    /// Neutral held as Red Bank collateral by the liquidator
    deposited_neutral: Decimal,
}

pub struct LiquidationExecutor {
    config: BotConfig,
    addresses: ProtocolAddresses,
    sources: Collaborators,
}

impl LiquidationExecutor {
    pub fn new(config: BotConfig, addresses: ProtocolAddresses, sources: Collaborators) -> Self {
        Self {
            config,
            addresses,
            sources,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Run one cycle end to end.
    #[instrument(skip(self), fields(liquidator = %self.addresses.liquidator))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::start();

        let snapshot = self.refresh().await?;

        debug!("Checking for liquidations");
        let positions = self
            .sources
            .positions
            .next_batch(self.config.cycle.batch_size)
            .await
            .context("Failed to fetch queued positions")?;

        if positions.is_empty() {
            debug!("No items for liquidation yet");
            tokio::time::sleep(self.config.cycle.idle_sleep()).await;
            return Ok(report.finish());
        }
        report.positions = positions.len();
        info!(count = positions.len(), "Found positions queued for liquidation");

        let neutral_balance = self
            .neutral_balance(&snapshot.balances)
            .saturating_add(snapshot.deposited_neutral);
        let neutral_price = snapshot
            .prices
            .get(&self.config.planner.neutral_denom)
            .unwrap_or(Decimal::ZERO);
        let available_value = neutral_balance
            .checked_mul(neutral_price)
            .context("Neutral capital value overflows")?;

        let sizing = LiquidationSizer::new(self.config.planner.min_liquidation_value).size(
            &positions,
            &snapshot.prices,
            available_value,
        );
        report.committed = sizing.committed;
        report.skipped = sizing.skipped.clone();

        if sizing.txs.is_empty() {
            info!(
                skipped = sizing.skipped.len(),
                available = %available_value,
                "No liquidations sized this cycle"
            );
            return Ok(report.finish());
        }

        match self.config.cycle.funding {
            FundingMode::Swap => {
                self.liquidate_with_swaps(&snapshot, &sizing, neutral_balance, &mut report)
                    .await?
            }
            FundingMode::Borrow => self.liquidate_with_borrows(&snapshot, &sizing, &mut report).await?,
        }
        report.txs = sizing.txs;

        if self.config.cycle.deposit_neutral {
            self.deposit_neutral(&mut report).await?;
        }

        info!(
            liquidated = report.txs.len(),
            batches = report.batches.len(),
            msgs = report.msg_count(),
            "Liquidation process complete"
        );
        Ok(report.finish())
    }

    /// Run cycles until `shutdown` resolves or the retry policy gives up.
    ///
    /// Shutdown is observed between cycles and during backoff. A cycle that
    /// has started always runs to completion.
    pub async fn run<F>(&self, policy: RetryPolicy, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut failures: u32 = 0;

        info!("Starting liquidation loop...");
        loop {
            if shutdown.as_mut().now_or_never().is_some() {
                info!("Shutdown requested, stopping liquidation loop");
                return Ok(());
            }
            let outcome = self.run_cycle().await;

            match outcome {
                Ok(report) => {
                    if failures > 0 {
                        info!(failures, "Cycle succeeded after failures");
                    }
                    failures = 0;
                    if !report.is_idle() {
                        debug!(
                            positions = report.positions,
                            liquidated = report.txs.len(),
                            skipped = report.skipped.len(),
                            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
                            "Cycle finished"
                        );
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    error!(error = %format!("{e:#}"), failures, "Liquidation cycle failed");
                    if policy.exhausted(failures) {
                        return Err(e.context(format!("Giving up after {failures} consecutive failed cycles")));
                    }
                    let delay = policy.delay_for(failures);
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("Shutdown requested, stopping liquidation loop");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn refresh(&self) -> Result<CycleSnapshot> {
        let liquidator = self.addresses.liquidator.as_str();
        let (pools, prices, balances, collaterals) = futures::try_join!(
            async { self.sources.pools.fetch_pools().await.context("Failed to fetch pools") },
            async { self.sources.prices.fetch_prices().await.context("Failed to fetch prices") },
            async {
                self.sources
                    .balances
                    .fetch_balances(liquidator)
                    .await
                    .context("Failed to fetch balances")
            },
            async {
                if !self.config.cycle.deposit_neutral {
                    return Ok(Vec::new());
                }
                self.sources
                    .balances
                    .fetch_collaterals(liquidator)
                    .await
                    .context("Failed to fetch collaterals")
            },
        )?;

        let deposited_neutral = self.neutral_balance(&collaterals);
        debug!(
            pools = pools.len(),
            prices = prices.len(),
            balances = balances.len(),
            deposited_neutral = %deposited_neutral,
            "Refreshed cycle data"
        );
        Ok(CycleSnapshot {
            router: AmmRouter::new(PoolSnapshot::new(pools)),
            prices,
            balances,
            deposited_neutral,
        })
    }

    fn neutral_balance(&self, balances: &[Coin]) -> Decimal {
        balances
            .iter()
            .find(|c| c.denom == self.config.planner.neutral_denom)
            .and_then(Coin::decimal_amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Swap funding: buy debts with neutral and liquidate in one batch, then
    /// withdraw and sell the won collateral. Deposited neutral is withdrawn at
    /// the head of the first batch.
    async fn liquidate_with_swaps(
        &self,
        snapshot: &CycleSnapshot,
        sizing: &SizingOutcome,
        neutral_balance: Decimal,
        report: &mut CycleReport,
    ) -> Result<()> {
        let liquidator = self.addresses.liquidator.as_str();
        let planner = SwapPlanner::new(&snapshot.router, &self.config.planner);

        let debt_plan = planner.plan_to_debts(liquidator, &sizing.debts, neutral_balance);
        let mut batch = Vec::with_capacity(debt_plan.msgs.len() + 2);
        if snapshot.deposited_neutral > Decimal::ZERO {
            batch.push(messages::make_withdraw_msg(
                liquidator,
                &self.config.planner.neutral_denom,
                &self.addresses.redbank,
            ));
        }
        batch.extend(debt_plan.msgs.iter().cloned());
        batch.push(messages::make_liquidate_many_msg(
            liquidator,
            &self.addresses.filterer,
            &sizing.txs,
            debt_plan.expected_coins(),
        ));
        self.submit_batch("liquidate", batch, report).await?;
        info!(count = sizing.txs.len(), "Successfully liquidated positions");

        self.settle_collateral(&planner, report).await
    }

    /// Borrow funding: borrow debts and liquidate, sell collateral, then
    /// buy debts back and repay.
    async fn liquidate_with_borrows(
        &self,
        snapshot: &CycleSnapshot,
        sizing: &SizingOutcome,
        report: &mut CycleReport,
    ) -> Result<()> {
        let liquidator = self.addresses.liquidator.as_str();
        let redbank = self.addresses.redbank.as_str();
        let planner = SwapPlanner::new(&snapshot.router, &self.config.planner);

        let mut batch: Vec<ProtocolMsg> = sizing
            .debts
            .iter()
            .map(|(denom, value)| messages::make_borrow_msg(liquidator, denom, value, redbank))
            .collect();
        batch.push(messages::make_liquidate_many_msg(
            liquidator,
            &self.addresses.filterer,
            &sizing.txs,
            sizing.debts.to_coins(),
        ));
        self.submit_batch("borrow_liquidate", batch, report).await?;
        info!(count = sizing.txs.len(), "Successfully liquidated positions");

        self.settle_collateral(&planner, report).await?;

        let balances = self
            .sources
            .balances
            .fetch_balances(liquidator)
            .await
            .context("Failed to refresh balances")?;
        let neutral_balance = self.neutral_balance(&balances);

        let debt_plan = planner.plan_to_debts(liquidator, &sizing.debts, neutral_balance);
        let repays = RepayPlanner::new(self.config.planner.dust_threshold).plan(
            liquidator,
            redbank,
            &sizing.debts,
            &debt_plan.expected,
        );
        let mut batch = debt_plan.msgs;
        batch.extend(repays);
        self.submit_batch("repay", batch, report).await?;
        Ok(())
    }

    /// Withdraw all Red Bank collateral and sell everything into neutral.
    async fn settle_collateral(&self, planner: &SwapPlanner<'_>, report: &mut CycleReport) -> Result<()> {
        let liquidator = self.addresses.liquidator.as_str();
        let (collaterals, balances) = futures::try_join!(
            async {
                self.sources
                    .balances
                    .fetch_collaterals(liquidator)
                    .await
                    .context("Failed to fetch collaterals")
            },
            async {
                self.sources
                    .balances
                    .fetch_balances(liquidator)
                    .await
                    .context("Failed to fetch balances")
            },
        )?;

        let combined = messages::combine_balances(&collaterals, &balances);
        let mut batch: Vec<ProtocolMsg> = collaterals
            .iter()
            .map(|c| messages::make_withdraw_msg(liquidator, &c.denom, &self.addresses.redbank))
            .collect();
        let neutral_plan = planner.plan_to_neutral(liquidator, &combined);
        debug!(expected_neutral = %neutral_plan.expected_neutral, "Planned collateral sale");
        batch.extend(neutral_plan.msgs);

        self.submit_batch("settle", batch, report).await?;
        Ok(())
    }

    async fn deposit_neutral(&self, report: &mut CycleReport) -> Result<()> {
        let liquidator = self.addresses.liquidator.as_str();
        let balances = self
            .sources
            .balances
            .fetch_balances(liquidator)
            .await
            .context("Failed to refresh balances")?;
        let neutral = self.neutral_balance(&balances).floor();
        if neutral <= Decimal::ZERO {
            return Ok(());
        }
        let msg = messages::make_deposit_msg(
            liquidator,
            Coin::new(self.config.planner.neutral_denom.clone(), neutral),
            &self.addresses.redbank,
        );
        self.submit_batch("deposit", vec![msg], report).await?;
        Ok(())
    }

    async fn submit_batch(
        &self,
        label: &'static str,
        msgs: Vec<ProtocolMsg>,
        report: &mut CycleReport,
    ) -> Result<Option<BroadcastResult>> {
        if msgs.is_empty() {
            debug!(batch = label, "Nothing to submit");
            return Ok(None);
        }

        let result = self
            .sources
            .submitter
            .submit(&self.addresses.liquidator, &msgs)
            .await
            .with_context(|| format!("Failed to submit {} batch", label))?;

        let liquidations = messages::parse_liquidation_results(&result.events);
        if !liquidations.is_empty() {
            for l in &liquidations {
                info!(
                    collateral = %l.collateral_denom,
                    collateral_amount = %l.collateral_amount,
                    debt = %l.debt_denom,
                    debt_amount = %l.debt_amount,
                    "Liquidation executed"
                );
            }
            report.liquidations.extend(liquidations);
        }
        if result.height == 0 {
            debug!(batch = label, "Broadcast result has no block height");
        }

        info!(batch = label, msgs = msgs.len(), height = result.height, "Submitted batch");
        report.batches.push(SubmittedBatch {
            label,
            msgs: msgs.len(),
            height: result.height,
        });
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Attribute, Event};
    use crate::pool::{Pool, PoolAsset};
    use crate::position::Position;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn coin(denom: &str, amount: &str) -> Coin {
        Coin {
            denom: denom.into(),
            amount: amount.into(),
        }
    }

    #[derive(Default)]
    struct FakeChain {
        fail_pools: bool,
        /// Apply deposits and withdrawals to the held balances
        stateful: bool,
        pool_calls: AtomicU32,
        positions: Mutex<Vec<Position>>,
        balances: Mutex<Vec<Coin>>,
        collaterals: Mutex<Vec<Coin>>,
        submitted: Mutex<Vec<Vec<ProtocolMsg>>>,
        /// Fired on the first submission
        on_submit: Mutex<Option<oneshot::Sender<()>>>,
    }

    fn take_denom(coins: &mut Vec<Coin>, denom: &str) -> Decimal {
        let taken = coins
            .iter()
            .filter(|c| c.denom == denom)
            .filter_map(Coin::decimal_amount)
            .sum();
        coins.retain(|c| c.denom != denom);
        taken
    }

    fn credit(coins: &mut Vec<Coin>, denom: &str, amount: Decimal) {
        let held = take_denom(coins, denom);
        coins.push(Coin::new(denom, held + amount));
    }

    impl FakeChain {
        fn apply(&self, msg: &ProtocolMsg) {
            let mut balances = self.balances.lock().unwrap();
            let mut collaterals = self.collaterals.lock().unwrap();
            match msg {
                ProtocolMsg::Deposit(call) => {
                    for fund in &call.funds {
                        let amount = fund.decimal_amount().unwrap();
                        let held = take_denom(&mut balances, &fund.denom);
                        balances.push(Coin::new(fund.denom.as_str(), held - amount));
                        credit(&mut collaterals, &fund.denom, amount);
                    }
                }
                ProtocolMsg::Withdraw(call) => {
                    let denom = call.msg["withdraw"]["denom"].as_str().unwrap();
                    let amount = take_denom(&mut collaterals, denom);
                    credit(&mut balances, denom, amount);
                }
                _ => {}
            }
        }

        fn kinds(&self) -> Vec<Vec<&'static str>> {
            self.submitted
                .lock()
                .unwrap()
                .iter()
                .map(|batch| batch.iter().map(ProtocolMsg::kind).collect())
                .collect()
        }
    }

    #[async_trait]
    impl PoolSource for FakeChain {
        async fn fetch_pools(&self) -> Result<Vec<Pool>> {
            self.pool_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pools {
                anyhow::bail!("lcd unavailable");
            }
            Ok(vec![
                Pool::new(
                    1,
                    PoolAsset::new("uatom", Decimal::from(1_000_000)),
                    PoolAsset::new("uusdc", Decimal::from(10_000_000)),
                    Decimal::new(2, 3),
                )?,
                Pool::new(
                    2,
                    PoolAsset::new("uosmo", Decimal::from(1_000_000_000)),
                    PoolAsset::new("uusdc", Decimal::from(1_000_000_000)),
                    Decimal::new(2, 3),
                )?,
            ])
        }
    }

    #[async_trait]
    impl PriceSource for FakeChain {
        async fn fetch_prices(&self) -> Result<PriceTable> {
            Ok(PriceTable::new()
                .with_price("uusdc", Decimal::ONE)
                .with_price("uatom", Decimal::TEN)
                .with_price("uosmo", Decimal::ONE))
        }
    }

    #[async_trait]
    impl BalanceSource for FakeChain {
        async fn fetch_balances(&self, _address: &str) -> Result<Vec<Coin>> {
            Ok(self.balances.lock().unwrap().clone())
        }

        async fn fetch_collaterals(&self, _address: &str) -> Result<Vec<Coin>> {
            Ok(self.collaterals.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl PositionSource for FakeChain {
        async fn next_batch(&self, limit: usize) -> Result<Vec<Position>> {
            let mut queue = self.positions.lock().unwrap();
            let n = limit.min(queue.len());
            Ok(queue.drain(..n).collect())
        }
    }

    #[async_trait]
    impl TxSubmitter for FakeChain {
        async fn submit(&self, _sender: &str, msgs: &[ProtocolMsg]) -> Result<BroadcastResult> {
            let signal = self.on_submit.lock().unwrap().take();
            if let Some(signal) = signal {
                let _ = signal.send(());
                tokio::task::yield_now().await;
            }
            if self.stateful {
                msgs.iter().for_each(|msg| self.apply(msg));
            }

            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(msgs.to_vec());
            let events = if msgs.iter().any(|m| m.kind() == "execute") {
                vec![Event {
                    kind: "wasm".into(),
                    attributes: [
                        ("collateral_denom", "uosmo"),
                        ("debt_denom", "uatom"),
                        ("collateral_amount", "210000"),
                        ("debt_amount", "20000"),
                    ]
                    .into_iter()
                    .map(|(k, v)| Attribute {
                        key: k.into(),
                        value: v.into(),
                    })
                    .collect(),
                }]
            } else {
                Vec::new()
            };
            Ok(BroadcastResult {
                height: 100 + submitted.len() as u64,
                events,
            })
        }
    }

    fn chain() -> FakeChain {
        FakeChain {
            positions: Mutex::new(vec![Position::new("osmo1borrower")
                .with_collateral("uosmo", Decimal::from(5_000_000))
                .with_debt("uatom", Decimal::from(20_000))]),
            balances: Mutex::new(vec![coin("uusdc", "1000000"), coin("uosmo", "200000000")]),
            collaterals: Mutex::new(vec![coin("uosmo", "4000000")]),
            ..Default::default()
        }
    }

    fn executor(chain: Arc<FakeChain>, config: BotConfig) -> LiquidationExecutor {
        LiquidationExecutor::new(
            config,
            ProtocolAddresses {
                liquidator: "osmo1liquidator".into(),
                redbank: "osmo1redbank".into(),
                filterer: "osmo1filterer".into(),
            },
            Collaborators {
                pools: chain.clone(),
                prices: chain.clone(),
                balances: chain.clone(),
                positions: chain.clone(),
                submitter: chain,
            },
        )
    }

    fn config() -> BotConfig {
        let mut config = BotConfig::default();
        config.cycle.idle_sleep_ms = 1;
        config
    }

    #[tokio::test]
    async fn test_swap_funded_cycle() {
        let chain = Arc::new(chain());
        let report = executor(chain.clone(), config()).run_cycle().await.unwrap();

        assert_eq!(report.positions, 1);
        assert_eq!(report.txs.len(), 1);
        assert_eq!(report.txs[0].amount, Decimal::from(20_000));
        assert_eq!(report.committed, Decimal::from(200_000));
        assert_eq!(chain.kinds(), vec![vec!["swap", "execute"], vec!["withdraw", "swap"]]);

        let submitted = chain.submitted.lock().unwrap();
        let call = submitted[0][1].as_contract_call().unwrap();
        assert_eq!(call.contract, "osmo1filterer");
        assert_eq!(call.funds.len(), 1);
        assert_eq!(call.funds[0].denom, "uatom");
        let attached: Decimal = call.funds[0].amount.parse().unwrap();
        assert!(attached > Decimal::from(20_000));

        // gas reserve kept back from the combined uosmo holdings
        let sale = submitted[1][1].as_swap().unwrap();
        assert_eq!(sale.token_in, coin("uosmo", "104000000"));

        assert_eq!(report.liquidations.len(), 1);
        assert_eq!(report.liquidations[0].debt_amount, "20000");
        assert_eq!(report.batches[0].height, 101);
    }

    #[tokio::test]
    async fn test_borrow_funded_cycle() {
        let chain = Arc::new(chain());
        let mut config = config();
        config.cycle.funding = FundingMode::Borrow;
        let report = executor(chain.clone(), config).run_cycle().await.unwrap();

        assert_eq!(
            chain.kinds(),
            vec![
                vec!["borrow", "execute"],
                vec!["withdraw", "swap"],
                vec!["swap", "repay"],
            ]
        );
        let submitted = chain.submitted.lock().unwrap();
        let borrow = submitted[0][0].as_contract_call().unwrap();
        assert_eq!(
            borrow.msg,
            serde_json::json!({ "borrow": { "denom": "uatom", "amount": "20000" } })
        );
        assert_eq!(submitted[0][1].as_contract_call().unwrap().funds, vec![coin("uatom", "20000")]);

        let repay = submitted[2][1].as_contract_call().unwrap();
        assert_eq!(repay.funds, vec![coin("uatom", "20000")]);
        assert_eq!(report.batches.len(), 3);
    }

    #[tokio::test]
    async fn test_deposit_neutral_at_cycle_end() {
        let chain = Arc::new(chain());
        let mut config = config();
        config.cycle.deposit_neutral = true;
        executor(chain.clone(), config).run_cycle().await.unwrap();

        let kinds = chain.kinds();
        assert_eq!(kinds.last().unwrap(), &vec!["deposit"]);
        let submitted = chain.submitted.lock().unwrap();
        let deposit = submitted.last().unwrap()[0].as_contract_call().unwrap();
        assert_eq!(deposit.funds, vec![coin("uusdc", "1000000")]);
    }

    #[tokio::test]
    async fn test_production_reuses_deposited_neutral() {
        let chain = Arc::new(FakeChain {
            stateful: true,
            ..chain()
        });
        let second = Position::new("osmo1second")
            .with_collateral("uosmo", Decimal::from(5_000_000))
            .with_debt("uatom", Decimal::from(20_000));
        chain.positions.lock().unwrap().push(second);

        let mut config = BotConfig::production();
        config.cycle.batch_size = 1;
        config.cycle.idle_sleep_ms = 1;
        let exec = executor(chain.clone(), config);

        let first = exec.run_cycle().await.unwrap();
        assert_eq!(first.txs.len(), 1);
        assert_eq!(chain.kinds().last().unwrap(), &vec!["deposit"]);
        assert_eq!(*chain.collaterals.lock().unwrap(), vec![coin("uusdc", "1000000")]);

        let second = exec.run_cycle().await.unwrap();
        assert_eq!(second.positions, 1);
        assert_eq!(second.txs.len(), 1);
        assert_eq!(second.txs[0].user_address, "osmo1second");
        assert_eq!(second.committed, Decimal::from(200_000));

        let kinds = chain.kinds();
        assert_eq!(kinds[3], vec!["withdraw", "swap", "execute"]);
        let submitted = chain.submitted.lock().unwrap();
        let withdraw = submitted[3][0].as_contract_call().unwrap();
        assert_eq!(withdraw.contract, "osmo1redbank");
        assert_eq!(withdraw.msg, serde_json::json!({ "withdraw": { "denom": "uusdc" } }));
        assert_eq!(submitted[3][1].as_swap().unwrap().token_in.denom, "uusdc");
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let chain = Arc::new(FakeChain::default());
        let report = executor(chain.clone(), config()).run_cycle().await.unwrap();
        assert!(report.is_idle());
        assert!(chain.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_capital_submits_nothing() {
        let chain = Arc::new(FakeChain {
            balances: Mutex::new(vec![coin("uosmo", "200000000")]),
            ..chain()
        });
        let report = executor(chain.clone(), config()).run_cycle().await.unwrap();
        assert_eq!(report.positions, 1);
        assert!(report.txs.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(chain.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_failures() {
        let chain = Arc::new(FakeChain {
            fail_pools: true,
            ..Default::default()
        });
        let exec = executor(chain.clone(), config());
        let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(2)).with_max_failures(3);

        let err = exec.run(policy, std::future::pending()).await.unwrap_err();
        assert!(format!("{err:#}").contains("lcd unavailable"));
        assert_eq!(chain.pool_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let chain = Arc::new(FakeChain::default());
        let exec = executor(chain, config());
        let shutdown = tokio::time::sleep(Duration::from_millis(20));
        exec.run(RetryPolicy::default(), shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_lets_started_cycle_finish() {
        let (signal, stopped) = oneshot::channel();
        let chain = Arc::new(FakeChain {
            on_submit: Mutex::new(Some(signal)),
            ..chain()
        });
        let exec = executor(chain.clone(), config());
        let shutdown = async {
            let _ = stopped.await;
        };

        exec.run(RetryPolicy::default(), shutdown).await.unwrap();
        assert_eq!(chain.kinds(), vec![vec!["swap", "execute"], vec!["withdraw", "swap"]]);
        assert!(chain.positions.lock().unwrap().is_empty());
    }
}
