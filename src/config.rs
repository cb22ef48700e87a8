//! Simulator configuration
//!
//! Every knob has the reference value as its default, so an empty JSON
//! object is a valid configuration file.

use crate::core::amount::Amount;
use crate::crypto::FingerprintKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of the ledger, the mining engine and the auto-mining driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Reward issued by every coinbase before fees
    pub block_reward: Amount,
    /// Fee charged on every transfer
    pub transfer_fee: Amount,
    /// Mempool transactions per block (besides the coinbase)
    pub block_batch_size: usize,

    pub starting_difficulty: f64,
    pub min_difficulty: f64,
    pub max_difficulty: f64,
    pub difficulty_step: f64,
    /// Number of recent blocks the retarget looks at
    pub retarget_window: usize,
    /// Target inter-block interval in milliseconds
    pub target_block_time_ms: u64,

    /// Nonces tried before a search gives up
    pub max_attempts: u64,
    /// Nonces per progress report
    pub progress_batch: u64,
    pub fingerprint: FingerprintKind,

    /// Network data points kept for analytics
    pub history_capacity: usize,

    pub auto_mining_interval_ms: u64,
    pub auto_mining_delay_ms: u64,
    pub auto_mining_min_txs: usize,
    pub auto_mining_max_txs: usize,

    pub data_dir: PathBuf,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            block_reward: Amount::from_cents(625),
            transfer_fee: Amount::from_cents(1),
            block_batch_size: 3,
            starting_difficulty: 4.0,
            min_difficulty: 1.0,
            max_difficulty: 8.0,
            difficulty_step: 0.5,
            retarget_window: 10,
            target_block_time_ms: 10_000,
            max_attempts: 100_000,
            progress_batch: 1_000,
            fingerprint: FingerprintKind::Simulated,
            history_capacity: 50,
            auto_mining_interval_ms: 6_000,
            auto_mining_delay_ms: 1_000,
            auto_mining_min_txs: 2,
            auto_mining_max_txs: 4,
            data_dir: PathBuf::from(".simulator_data"),
        }
    }
}

impl SimulatorConfig {
    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: SimulatorConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "block_batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.min_difficulty >= 0.0 && self.min_difficulty <= self.max_difficulty) {
            return Err(ConfigError::Invalid(format!(
                "difficulty bounds [{}, {}] are not ordered",
                self.min_difficulty, self.max_difficulty
            )));
        }
        if self.max_difficulty >= 16.0 {
            return Err(ConfigError::Invalid(
                "max_difficulty must be below 16".to_string(),
            ));
        }
        if self.starting_difficulty < self.min_difficulty
            || self.starting_difficulty > self.max_difficulty
        {
            return Err(ConfigError::Invalid(format!(
                "starting_difficulty {} outside [{}, {}]",
                self.starting_difficulty, self.min_difficulty, self.max_difficulty
            )));
        }
        if self.target_block_time_ms == 0 || self.progress_batch == 0 {
            return Err(ConfigError::Invalid(
                "target_block_time_ms and progress_batch must be positive".to_string(),
            ));
        }
        if self.auto_mining_min_txs > self.auto_mining_max_txs {
            return Err(ConfigError::Invalid(
                "auto_mining_min_txs exceeds auto_mining_max_txs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn auto_mining_interval(&self) -> Duration {
        Duration::from_millis(self.auto_mining_interval_ms)
    }

    pub fn auto_mining_delay(&self) -> Duration {
        Duration::from_millis(self.auto_mining_delay_ms)
    }
}
