//! Engine configuration
//!
//! Loaded from a YAML file with environment overrides for the pieces that
//! are deployment secrets (`DATABASE_URL`, `REDIS_URL`, `RPC_URL`). Every
//! knob has a default matching the engine's documented behavior, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Polygon mainnet defaults, overridable per deployment.
const DEFAULT_DATA_API_URL: &str = "https://data-api.polymarket.com";
const DEFAULT_CLOB_API_URL: &str = "https://clob.polymarket.com";
const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";
const DEFAULT_CHAIN_ID: u64 = 137;
const DEFAULT_SETTLEMENT_CONTRACT: &str = "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045";
const DEFAULT_COLLATERAL: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduler cadence per task.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Parallel task execution.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Per-task mutex TTL. Must comfortably exceed worst-case tick latency.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    /// Reconciliation cadence, in ticks.
    #[serde(default = "default_sync_every_n_ticks")]
    pub sync_every_n_ticks: u64,

    /// Per-order retry ceiling on the Live path.
    #[serde(default = "default_live_retry_limit")]
    pub live_retry_limit: u32,

    /// Protocol minimum order notional, in quote units.
    #[serde(default = "default_min_order")]
    pub min_order_usd: f64,

    /// Protocol minimum order size, in tokens.
    #[serde(default = "default_min_order")]
    pub min_order_tokens: f64,

    /// BUY slippage ceiling, percent.
    #[serde(default = "default_slippage_pct_limit_buy")]
    pub slippage_pct_limit_buy: f64,

    /// BUY upper bound on unit price.
    #[serde(default = "default_price_cap_buy")]
    pub price_cap_buy: f64,

    /// Live BUY absolute gap allowed between best ask and target price.
    #[serde(default = "default_live_slippage_guard_abs")]
    pub live_slippage_guard_abs: f64,

    /// Ingestion window for Live tasks, seconds.
    #[serde(default = "default_activity_window_sec_live")]
    pub activity_window_sec_live: i64,

    /// Ingestion window for Mock tasks, seconds.
    #[serde(default = "default_activity_window_sec_mock")]
    pub activity_window_sec_mock: i64,

    #[serde(default = "default_data_api_url")]
    pub data_api_url: String,

    #[serde(default = "default_clob_api_url")]
    pub clob_api_url: String,

    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_settlement_contract")]
    pub settlement_contract_address: String,

    #[serde(default = "default_collateral")]
    pub collateral_address: String,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// From DATABASE_URL (not in YAML).
    #[serde(skip)]
    pub database_url: String,

    /// From REDIS_URL (not in YAML).
    #[serde(skip)]
    pub redis_url: String,
}

fn default_tick_interval_ms() -> u64 {
    5000
}
fn default_worker_concurrency() -> usize {
    5
}
fn default_lock_ttl_ms() -> u64 {
    600_000
}
fn default_sync_every_n_ticks() -> u64 {
    30
}
fn default_live_retry_limit() -> u32 {
    3
}
fn default_min_order() -> f64 {
    1.0
}
fn default_slippage_pct_limit_buy() -> f64 {
    5.0
}
fn default_price_cap_buy() -> f64 {
    0.99
}
fn default_live_slippage_guard_abs() -> f64 {
    0.05
}
fn default_activity_window_sec_live() -> i64 {
    60
}
fn default_activity_window_sec_mock() -> i64 {
    3600
}
fn default_data_api_url() -> String {
    DEFAULT_DATA_API_URL.to_string()
}
fn default_clob_api_url() -> String {
    DEFAULT_CLOB_API_URL.to_string()
}
fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}
fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}
fn default_settlement_contract() -> String {
    DEFAULT_SETTLEMENT_CONTRACT.to_string()
}
fn default_collateral() -> String {
    DEFAULT_COLLATERAL.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("defaults are total")
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file, then apply env overrides.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: EngineConfig = serde_yaml::from_str(&yaml_content)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults + env, for deployments that ship no YAML file.
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        dotenv::dotenv().ok();

        self.database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::EnvVarMissing("DATABASE_URL".to_string()))?;
        self.redis_url = std::env::var("REDIS_URL")
            .map_err(|_| ConfigError::EnvVarMissing("REDIS_URL".to_string()))?;

        if let Ok(rpc_url) = std::env::var("RPC_URL") {
            info!("Overriding RPC URL from environment variable");
            self.rpc_url = rpc_url;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.worker_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "worker_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.lock_ttl_ms <= self.tick_interval_ms {
            return Err(ConfigError::ValidationError(
                "lock_ttl_ms must exceed tick_interval_ms".to_string(),
            ));
        }

        if self.sync_every_n_ticks == 0 {
            return Err(ConfigError::ValidationError(
                "sync_every_n_ticks must be greater than 0".to_string(),
            ));
        }

        if self.fixed_bounds_invalid() {
            return Err(ConfigError::ValidationError(
                "order minima and slippage bounds must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.price_cap_buy) {
            return Err(ConfigError::ValidationError(
                "price_cap_buy must be between 0 and 1".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    fn fixed_bounds_invalid(&self) -> bool {
        self.min_order_usd <= 0.0
            || self.min_order_tokens <= 0.0
            || self.slippage_pct_limit_buy <= 0.0
            || self.live_slippage_guard_abs <= 0.0
            || self.live_retry_limit == 0
            || self.activity_window_sec_live <= 0
            || self.activity_window_sec_mock <= 0
    }

    /// Ingestion window for a task mode, in seconds.
    pub fn activity_window_sec(&self, live: bool) -> i64 {
        if live {
            self.activity_window_sec_live
        } else {
            self.activity_window_sec_mock
        }
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Tick interval: {} ms", self.tick_interval_ms);
        info!("  Worker concurrency: {}", self.worker_concurrency);
        info!("  Lock TTL: {} ms", self.lock_ttl_ms);
        info!("  Reconcile every: {} ticks", self.sync_every_n_ticks);
        info!("  Fixed minima: ${} / {} tokens", self.min_order_usd, self.min_order_tokens);
        info!("  BUY slippage limit: {}%", self.slippage_pct_limit_buy);
        info!("  Data API: {}", self.data_api_url);
        info!("  CLOB API: {}", self.clob_api_url);
        info!("  RPC: {}", self.rpc_url);
        info!("  Log level: {}", self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval_ms, 5000);
        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.lock_ttl_ms, 600_000);
        assert_eq!(config.sync_every_n_ticks, 30);
        assert_eq!(config.live_retry_limit, 3);
        assert_eq!(config.min_order_usd, 1.0);
        assert_eq!(config.min_order_tokens, 1.0);
        assert_eq!(config.slippage_pct_limit_buy, 5.0);
        assert_eq!(config.price_cap_buy, 0.99);
        assert_eq!(config.live_slippage_guard_abs, 0.05);
        assert_eq!(config.activity_window_sec_live, 60);
        assert_eq!(config.activity_window_sec_mock, 3600);
        assert_eq!(config.chain_id, 137);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = "tick_interval_ms: 1000\nworker_concurrency: 2\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.lock_ttl_ms, 600_000);
    }

    #[test]
    fn test_validation_rejects_zero_cadence() {
        let mut config = EngineConfig::default();
        config.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_ttl_below_tick() {
        let mut config = EngineConfig::default();
        config.lock_ttl_ms = config.tick_interval_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_selection() {
        let config = EngineConfig::default();
        assert_eq!(config.activity_window_sec(true), 60);
        assert_eq!(config.activity_window_sec(false), 3600);
    }
}
