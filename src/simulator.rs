//! Simulator facade
//!
//! The surface a front end drives: four entry points (submit a transfer,
//! mine the next block, reset the network, toggle automatic mining) plus
//! read-only snapshot queries.

use crate::analytics::{ChainStats, NetworkDataPoint};
use crate::config::{ConfigError, SimulatorConfig};
use crate::core::amount::{Amount, AmountError};
use crate::core::chain::ChainError;
use crate::core::state::{LedgerState, StateSnapshot};
use crate::core::validator::Validator;
use crate::core::{Block, Transaction};
use crate::crypto::Fingerprint;
use crate::mining::auto::AutoMiner;
use crate::mining::miner::{Miner, MinerError, MiningProgress};
use crate::mining::pow::RetargetParams;
use crate::storage::StorageError;
use crate::wallet::WalletId;
use chrono::Utc;
use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors surfaced by the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Invalid amount: {0}")]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Miner(#[from] MinerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A simulated network
#[derive(Clone)]
pub struct Simulator {
    miner: Miner,
    auto: Arc<Mutex<Option<AutoMiner>>>,
}

impl Simulator {
    /// A fresh network at genesis
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        let fingerprint = config.fingerprint.build();
        Self::with_fingerprint(config, fingerprint)
    }

    /// Same as [`new`](Self::new) with a specific fingerprint
    pub fn with_fingerprint(
        config: SimulatorConfig,
        fingerprint: Arc<dyn Fingerprint>,
    ) -> Result<Self, SimulatorError> {
        config.validate()?;
        let state = LedgerState::genesis(config.history_capacity);
        Ok(Self::from_state(state, config, fingerprint))
    }

    /// Restore a network from a persisted snapshot
    pub fn from_snapshot(
        snapshot: StateSnapshot,
        config: SimulatorConfig,
    ) -> Result<Self, SimulatorError> {
        config.validate()?;
        let state = LedgerState::from_snapshot(snapshot, config.history_capacity)?;
        let fingerprint = config.fingerprint.build();
        Ok(Self::from_state(state, config, fingerprint))
    }

    fn from_state(
        state: LedgerState,
        config: SimulatorConfig,
        fingerprint: Arc<dyn Fingerprint>,
    ) -> Self {
        let state = Arc::new(RwLock::new(state));
        Self {
            miner: Miner::with_fingerprint(state, Arc::new(config), fingerprint),
            auto: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        self.miner.config()
    }

    pub fn progress(&self) -> &MiningProgress {
        self.miner.progress()
    }

    /// Queue a transfer of `amount_text` BTC between two wallets, paying
    /// the configured fee. Nothing changes when it is rejected.
    pub async fn submit_transfer(
        &self,
        from: WalletId,
        to: WalletId,
        amount_text: &str,
    ) -> Result<Transaction, SimulatorError> {
        let amount = Amount::parse_btc(amount_text)?;
        let mut state = self.miner.state().write().await;
        let tx = state.submit_wallet_transfer(
            from,
            to,
            amount,
            self.config().transfer_fee,
            self.miner.fingerprint(),
        )?;
        info!("Queued transaction {}: {} {} -> {}", tx.id, amount, from, to);
        Ok(tx)
    }

    /// Run one mining cycle; `None` when there was nothing to do
    pub async fn mine_next_block(&self) -> Result<Option<Block>, SimulatorError> {
        Ok(self.miner.mine_next_block().await?)
    }

    /// Return the whole network to genesis. Automatic mining is switched
    /// off, and a search in flight is cancelled and its result discarded.
    pub async fn reset_network(&self) -> Result<(), SimulatorError> {
        let mut state = self.miner.state().write().await;
        state.reset()?;
        self.miner.progress().cancel();
        self.set_automatic_mining(false);
        info!("Network reset to genesis");
        Ok(())
    }

    /// Start or stop the automatic mining driver. Starting requires a
    /// tokio runtime.
    pub fn set_automatic_mining(&self, enabled: bool) {
        let mut auto = self.auto.lock().unwrap_or_else(PoisonError::into_inner);
        match (enabled, auto.as_ref()) {
            (true, Some(driver)) if driver.is_running() => {}
            (true, _) => *auto = Some(AutoMiner::start(self.miner.clone())),
            (false, _) => {
                if let Some(driver) = auto.take() {
                    driver.cancel();
                }
            }
        }
    }

    pub fn is_automatic_mining(&self) -> bool {
        self.auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(AutoMiner::is_running)
            .unwrap_or(false)
    }

    /// Stop automatic mining and wait for the driver to exit
    pub async fn shutdown(&self) {
        let driver = self
            .auto
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver {
            driver.stop().await;
        }
    }

    // Snapshot queries

    pub async fn chain(&self) -> Vec<Block> {
        self.miner.state().read().await.chain().to_vec()
    }

    /// Pending transactions, oldest first
    pub async fn mempool(&self) -> Vec<Transaction> {
        self.miner.state().read().await.mempool().iter().cloned().collect()
    }

    pub async fn balances(&self) -> BTreeMap<WalletId, Amount> {
        let state = self.miner.state().read().await;
        state
            .wallets()
            .iter()
            .map(|(id, wallet)| (*id, wallet.balance(state.ledger())))
            .collect()
    }

    pub async fn balance_of_address(&self, address: &str) -> Amount {
        self.miner.state().read().await.ledger().balance_of(address)
    }

    pub async fn validators(&self) -> Vec<Validator> {
        self.miner.state().read().await.validators().to_vec()
    }

    pub async fn history(&self) -> Vec<NetworkDataPoint> {
        self.miner.state().read().await.history().points().cloned().collect()
    }

    /// Most recent network data point
    pub async fn latest_data_point(&self) -> Option<NetworkDataPoint> {
        self.miner.state().read().await.history().latest().cloned()
    }

    pub async fn stats(&self) -> ChainStats {
        let state = self.miner.state().read().await;
        ChainStats::derive(&state, &RetargetParams::from(self.config()), Utc::now())
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.miner.state().read().await.to_snapshot()
    }
}
