//! Configuration file management.
//!
//! The daemon reads `config.toml` from the working directory, or from the
//! path in `CADENCE_CONFIG`. Every section and field is optional.

use std::path::PathBuf;

use cadence_epoch::OrchestratorSettings;
use cadence_gov::GovernanceParameters;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "CADENCE_CONFIG";

/// Complete daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Simulated chain clock.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Epoch timing handed to the orchestrator.
    #[serde(default)]
    pub epochs: OrchestratorSettings,
    /// Initial governance parameter tuple.
    #[serde(default = "default_governance")]
    pub governance: GovernanceParameters,
    /// Simulated feeds.
    #[serde(default)]
    pub feeds: FeedsConfig,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

/// Simulated chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Simulated seconds between blocks.
    #[serde(default = "default_block_time")]
    pub block_time_secs: u64,
    /// Wall-clock milliseconds between ticks (one block per tick).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Timestamp of the first simulated block.
    #[serde(default)]
    pub start_timestamp: u64,
    /// Seed for block entropy. Absent = seeded from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Simulated feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// One feed per symbol.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Probability that any single feed call reverts.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    /// Rewardable participants each feed reports when it finalizes normally.
    #[serde(default = "default_participants")]
    pub participants: usize,
    /// Reward credited per price epoch by the in-memory ledger.
    #[serde(default = "default_reward_per_epoch")]
    pub reward_per_epoch: u128,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_governance() -> GovernanceParameters {
    GovernanceParameters {
        max_vote_power_nat_threshold_fraction: 10,
        max_vote_power_asset_threshold_fraction: 10,
        low_asset_usd_threshold: 200_000_000,
        high_asset_usd_threshold: 3_000_000_000,
        high_asset_turnout_threshold_bips: 100,
        low_nat_turnout_threshold_bips: 300,
        elastic_band_width_ppm: 50_000,
        reward_expiry_offset_seconds: 90 * 86_400,
        trusted_addresses: Vec::new(),
    }
}

fn default_block_time() -> u64 {
    2
}

fn default_tick_interval() -> u64 {
    250
}

fn default_symbols() -> Vec<String> {
    ["XRP", "LTC", "XLM", "DOGE", "ADA"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_failure_rate() -> f64 {
    0.02
}

fn default_participants() -> usize {
    4
}

fn default_reward_per_epoch() -> u128 {
    1_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            epochs: OrchestratorSettings::default(),
            governance: default_governance(),
            feeds: FeedsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_time_secs: default_block_time(),
            tick_interval_ms: default_tick_interval(),
            start_timestamp: 0,
            seed: None,
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            failure_rate: default_failure_rate(),
            participants: default_participants(),
            reward_per_epoch: default_reward_per_epoch(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and sanity-check a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.epochs.validate()?;
        config.governance.validate()?;
        if config.chain.block_time_secs == 0 {
            anyhow::bail!("chain.block_time_secs must be non-zero");
        }
        if !(0.0..=1.0).contains(&config.feeds.failure_rate) {
            anyhow::bail!("feeds.failure_rate must be within [0, 1]");
        }
        Ok(config)
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        // Check env var override first
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        PathBuf::from("config.toml")
    }
}
