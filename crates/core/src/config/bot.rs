//! Configuration management with profile support.
//!
//! Planning thresholds, cycle behaviour and retry timing live here, with
//! profiles for testing and production. Deployment addresses and endpoints
//! come from the environment instead (see the binary).

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::executor::FundingMode;
use crate::selector::RequiredInputSelection;
use crate::swap_planner::SwapInputPolicy;

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be a fraction in [0, 1), got {value}")]
    InvalidFraction { field: &'static str, value: Decimal },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: Decimal },

    #[error("neutral asset denom is empty")]
    EmptyNeutralDenom,

    #[error("cycle batch size must be at least 1")]
    ZeroBatchSize,

    #[error("retry base delay {base_ms}ms exceeds max delay {max_ms}ms")]
    InvalidRetryDelays { base_ms: u64, max_ms: u64 },
}

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Sizing and swap planning thresholds
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Per-cycle orchestration
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Backoff between failed cycles
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Thresholds used by the sizer and the swap/repay planners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Settlement asset collateral is sold into
    #[serde(default = "default_neutral_denom")]
    pub neutral_denom: String,

    /// Fee denom; part of its balance is never swapped
    #[serde(default = "default_gas_denom")]
    pub gas_denom: String,

    /// Gas denom units kept back from collateral swaps
    #[serde(default = "default_gas_reserve")]
    pub gas_reserve: Decimal,

    /// Amounts at or below this are ignored by swaps and repays
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: Decimal,

    /// Remaining capital (quote units) at or below this stops sizing
    #[serde(default = "default_min_liquidation_value")]
    pub min_liquidation_value: Decimal,

    /// Slippage tolerated when selling collateral into neutral
    #[serde(default = "default_collateral_slippage")]
    pub collateral_slippage: Decimal,

    /// Overshoot added to each debt target before pricing the swap
    #[serde(default = "default_debt_buffer")]
    pub debt_buffer: Decimal,

    /// Slippage tolerated when buying debt with neutral
    #[serde(default = "default_debt_slippage")]
    pub debt_slippage: Decimal,

    #[serde(default)]
    pub required_input: RequiredInputSelection,

    #[serde(default)]
    pub swap_input: SwapInputPolicy,
}

fn default_neutral_denom() -> String {
    "uusdc".to_string()
}
fn default_gas_denom() -> String {
    "uosmo".to_string()
}
fn default_gas_reserve() -> Decimal {
    Decimal::from(100_000_000u64)
}
fn default_dust_threshold() -> Decimal {
    Decimal::ONE_THOUSAND
}
fn default_min_liquidation_value() -> Decimal {
    Decimal::ONE_HUNDRED
}
fn default_collateral_slippage() -> Decimal {
    Decimal::new(25, 3)
}
fn default_debt_buffer() -> Decimal {
    Decimal::new(25, 3)
}
fn default_debt_slippage() -> Decimal {
    Decimal::new(2, 2)
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            neutral_denom: default_neutral_denom(),
            gas_denom: default_gas_denom(),
            gas_reserve: default_gas_reserve(),
            dust_threshold: default_dust_threshold(),
            min_liquidation_value: default_min_liquidation_value(),
            collateral_slippage: default_collateral_slippage(),
            debt_buffer: default_debt_buffer(),
            debt_slippage: default_debt_slippage(),
            required_input: RequiredInputSelection::default(),
            swap_input: SwapInputPolicy::default(),
        }
    }
}

/// Cycle orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Maximum positions popped per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep when the position queue is empty (milliseconds)
    #[serde(default = "default_idle_sleep")]
    pub idle_sleep_ms: u64,

    /// How debt assets are sourced before liquidating
    #[serde(default)]
    pub funding: FundingMode,

    /// Deposit leftover neutral back into Red Bank at cycle end
    #[serde(default)]
    pub deposit_neutral: bool,
}

fn default_batch_size() -> usize {
    25
}
fn default_idle_sleep() -> u64 {
    200
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            idle_sleep_ms: default_idle_sleep(),
            funding: FundingMode::default(),
            deposit_neutral: false,
        }
    }
}

impl CycleConfig {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

/// Backoff applied by the service loop after a failed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Stop the service after this many failures in a row (None = never)
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
}

fn default_base_delay() -> u64 {
    200
}
fn default_max_delay() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_consecutive_failures: None,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            planner: PlannerConfig::default(),
            cycle: CycleConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path))?;
        Ok(config)
    }

    /// Small batches and no dust floor, for exercising a devnet.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            planner: PlannerConfig {
                gas_reserve: Decimal::from(10_000_000u64), // 10 tokens
                dust_threshold: Decimal::ONE,
                min_liquidation_value: Decimal::ONE,
                collateral_slippage: Decimal::new(5, 2),
                debt_slippage: Decimal::new(5, 2),
                ..Default::default()
            },
            cycle: CycleConfig {
                batch_size: 5,
                idle_sleep_ms: 1_000,
                ..Default::default()
            },
            retry: RetryConfig {
                base_delay_ms: 500,
                max_delay_ms: 2_000,
                max_consecutive_failures: Some(10),
            },
        }
    }

    /// Production profile: default thresholds, neutral redeposited.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            planner: PlannerConfig::default(),
            cycle: CycleConfig {
                deposit_neutral: true,
                ..Default::default()
            },
            retry: RetryConfig {
                base_delay_ms: 200,
                max_delay_ms: 10_000,
                max_consecutive_failures: None,
            },
        }
    }

    /// Profile by name. Unknown names fall back to the default profile.
    pub fn profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Load from BOT_CONFIG (a TOML path) if set, otherwise the BOT_PROFILE
    /// profile. NEUTRAL_ASSET_DENOM and GAS_DENOM override the result.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var("BOT_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => {
                let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
                Self::profile(&profile)
            }
        };
        config.apply_overrides(
            std::env::var("NEUTRAL_ASSET_DENOM").ok(),
            std::env::var("GAS_DENOM").ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Override the neutral and gas denoms when given.
    pub fn apply_overrides(&mut self, neutral_denom: Option<String>, gas_denom: Option<String>) {
        if let Some(denom) = neutral_denom.filter(|d| !d.is_empty()) {
            self.planner.neutral_denom = denom;
        }
        if let Some(denom) = gas_denom.filter(|d| !d.is_empty()) {
            self.planner.gas_denom = denom;
        }
    }

    /// Check thresholds for values the planners cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.planner;
        if p.neutral_denom.trim().is_empty() {
            return Err(ConfigError::EmptyNeutralDenom);
        }
        for (field, value) in [
            ("collateral_slippage", p.collateral_slippage),
            ("debt_buffer", p.debt_buffer),
            ("debt_slippage", p.debt_slippage),
        ] {
            if value < Decimal::ZERO || value >= Decimal::ONE {
                return Err(ConfigError::InvalidFraction { field, value });
            }
        }
        for (field, value) in [
            ("gas_reserve", p.gas_reserve),
            ("dust_threshold", p.dust_threshold),
            ("min_liquidation_value", p.min_liquidation_value),
        ] {
            if value < Decimal::ZERO {
                return Err(ConfigError::Negative { field, value });
            }
        }
        if self.cycle.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidRetryDelays {
                base_ms: self.retry.base_delay_ms,
                max_ms: self.retry.max_delay_ms,
            });
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            neutral = %self.planner.neutral_denom,
            gas = %self.planner.gas_denom,
            gas_reserve = %self.planner.gas_reserve,
            dust = %self.planner.dust_threshold,
            min_liquidation_value = %self.planner.min_liquidation_value,
            "Planner thresholds"
        );
        tracing::info!(
            collateral_slippage = %self.planner.collateral_slippage,
            debt_buffer = %self.planner.debt_buffer,
            debt_slippage = %self.planner.debt_slippage,
            required_input = ?self.planner.required_input,
            swap_input = ?self.planner.swap_input,
            "Swap parameters"
        );
        tracing::info!(
            batch_size = self.cycle.batch_size,
            funding = ?self.cycle.funding,
            deposit_neutral = self.cycle.deposit_neutral,
            "Cycle settings"
        );
        tracing::info!(
            base_delay_ms = self.retry.base_delay_ms,
            max_delay_ms = self.retry.max_delay_ms,
            max_failures = ?self.retry.max_consecutive_failures,
            "Retry policy"
        );
    }
}
