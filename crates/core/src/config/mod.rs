//! Runtime configuration: planner thresholds, cycle settings and retry
//! timing, with named profiles and TOML overrides.

mod bot;

pub use bot::{BotConfig, ConfigError, CycleConfig, PlannerConfig, RetryConfig};
