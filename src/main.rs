//! Red Bank Liquidation Bot
//!
//! Liquidates unhealthy Red Bank positions on Osmosis.
//! Features:
//! - Capital-bounded sizing of queued positions
//! - Multi-hop AMM routing with exact constant-product quotes
//! - Swap or borrow funding of debt assets
//! - Retrying service loop with exponential backoff

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::{HiveClient, LcdClient, RedisPositionQueue};
use liquidator_core::{
    BotConfig, BroadcastResult, Collaborators, LiquidationExecutor, ProtocolAddresses, ProtocolMsg,
    RetryPolicy, TxSubmitter,
};

/// Environment variable names.
mod env {
    pub const LCD_ENDPOINT: &str = "LCD_ENDPOINT";
    pub const HIVE_ENDPOINT: &str = "HIVE_ENDPOINT";
    pub const REDIS_URL: &str = "REDIS_URL";
    pub const POSITION_QUEUE: &str = "POSITION_QUEUE";
    pub const REDBANK_ADDRESS: &str = "REDBANK_ADDRESS";
    pub const ORACLE_ADDRESS: &str = "ORACLE_ADDRESS";
    pub const LIQUIDATION_FILTERER: &str = "LIQUIDATION_FILTERER_CONTRACT";
    pub const LIQUIDATOR_ADDRESS: &str = "LIQUIDATOR_ADDRESS";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

const DEFAULT_QUEUE: &str = "liquidation_queue";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    // BOT_CONFIG (file) or BOT_PROFILE (testing, production) selects the tuning
    let bot_config = BotConfig::from_env()?;
    bot_config.log_config();

    let config = load_config()?;
    info!(
        liquidator = %config.addresses.liquidator,
        redbank = %config.addresses.redbank,
        filterer = %config.addresses.filterer,
        "Starting Red Bank Liquidation Bot"
    );

    let executor = initialize_executor(bot_config, config).await?;
    let policy = RetryPolicy::from(&executor.config().retry);

    executor.run(policy, shutdown_signal()).await?;

    info!("Liquidation bot stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,liquidator_core=debug,liquidator_api=debug"));
    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Endpoints and addresses loaded from environment.
struct Config {
    lcd_endpoint: String,
    hive_endpoint: String,
    redis_url: String,
    queue: String,
    oracle: String,
    addresses: ProtocolAddresses,
}

fn load_config() -> Result<Config> {
    let get_env = |name: &str| -> Result<String> {
        std::env::var(name).map_err(|_| anyhow::anyhow!("Missing env var: {}", name))
    };

    Ok(Config {
        lcd_endpoint: get_env(env::LCD_ENDPOINT)?,
        hive_endpoint: get_env(env::HIVE_ENDPOINT)?,
        redis_url: get_env(env::REDIS_URL)
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        queue: get_env(env::POSITION_QUEUE).unwrap_or_else(|_| DEFAULT_QUEUE.to_string()),
        oracle: get_env(env::ORACLE_ADDRESS)?,
        addresses: ProtocolAddresses {
            liquidator: get_env(env::LIQUIDATOR_ADDRESS)?,
            redbank: get_env(env::REDBANK_ADDRESS)?,
            filterer: get_env(env::LIQUIDATION_FILTERER)?,
        },
    })
}

async fn initialize_executor(bot_config: BotConfig, config: Config) -> Result<LiquidationExecutor> {
    info!("Initializing components...");

    let lcd = Arc::new(LcdClient::new(
        &config.lcd_endpoint,
        &config.addresses.redbank,
        &config.oracle,
    ));
    info!(endpoint = %config.lcd_endpoint, "LCD client configured");

    let hive = HiveClient::new(&config.hive_endpoint, &config.addresses.redbank);
    let queue = Arc::new(RedisPositionQueue::connect(&config.redis_url, &config.queue, hive).await?);

    let sources = Collaborators {
        pools: lcd.clone(),
        prices: lcd.clone(),
        balances: lcd,
        positions: queue,
        submitter: Arc::new(DryRunSubmitter),
    };

    info!("All components initialized");
    Ok(LiquidationExecutor::new(bot_config, config.addresses, sources))
}

/// Logs each batch instead of broadcasting it.
///
/// Signing is left to an external broadcaster reading these logs.
struct DryRunSubmitter;

#[async_trait]
impl TxSubmitter for DryRunSubmitter {
    async fn submit(&self, sender: &str, msgs: &[ProtocolMsg]) -> Result<BroadcastResult> {
        for msg in msgs {
            info!(sender, kind = msg.kind(), msg = %serde_json::to_string(msg)?, "Dry-run message");
        }
        Ok(BroadcastResult::default())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
