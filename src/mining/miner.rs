//! Mining driver
//!
//! Runs one mining cycle end to end. The template is assembled under the
//! state lock, the proof search runs on the blocking pool with no lock
//! held, and the result is committed in one write.

use crate::config::SimulatorConfig;
use crate::core::chain::ChainError;
use crate::core::state::{ChainPhase, LedgerState};
use crate::core::Block;
use crate::crypto::Fingerprint;
use crate::mining::pow::{search, MiningError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;

/// Ledger state shared between the driver and observers
pub type SharedState = Arc<RwLock<LedgerState>>;

/// Errors of a mining cycle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MinerError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Mining(#[from] MiningError),
}

/// Live view of the search in flight
#[derive(Debug, Default)]
pub struct MiningProgress {
    active: AtomicBool,
    attempts: AtomicU64,
    height: AtomicU64,
    cancel_flag: Mutex<Arc<AtomicBool>>,
}

impl MiningProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Attempts made so far by the current (or last) search
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Height of the block being mined
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    /// Ask the running search to stop at its next batch boundary
    pub fn cancel(&self) {
        self.cancel_flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store(true, Ordering::Relaxed);
        self.active.store(false, Ordering::Relaxed);
    }

    /// Install a fresh cancel flag for a new search. An older search keeps
    /// its own flag, so cancelling it never leaks into the next one.
    fn begin(&self, height: u64) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        *self
            .cancel_flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&flag);
        self.attempts.store(0, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
        self.active.store(true, Ordering::Relaxed);
        flag
    }

    /// Publish the attempt count of the search owning `flag`. A search
    /// that was cancelled no longer reports.
    fn record(&self, flag: &AtomicBool, attempts: u64) {
        if !flag.load(Ordering::Relaxed) {
            self.attempts.store(attempts, Ordering::Relaxed);
        }
    }

    fn finish(&self) {
        self.active.store(false, Ordering::Relaxed);
    }
}

/// Miner for creating new blocks
#[derive(Clone)]
pub struct Miner {
    state: SharedState,
    fingerprint: Arc<dyn Fingerprint>,
    config: Arc<SimulatorConfig>,
    progress: Arc<MiningProgress>,
}

impl Miner {
    pub fn with_fingerprint(
        state: SharedState,
        config: Arc<SimulatorConfig>,
        fingerprint: Arc<dyn Fingerprint>,
    ) -> Self {
        Self {
            state,
            fingerprint,
            config,
            progress: Arc::new(MiningProgress::new()),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn fingerprint(&self) -> &dyn Fingerprint {
        self.fingerprint.as_ref()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn progress(&self) -> &MiningProgress {
        &self.progress
    }

    /// Run one mining cycle.
    ///
    /// Returns `Ok(None)` without side effects when the mempool is empty or
    /// a cycle is already running, and also when the network was reset
    /// while the search was in flight.
    pub async fn mine_next_block(&self) -> Result<Option<Block>, MinerError> {
        let (template, cancel) = {
            let mut state = self.state.write().await;
            if state.phase() != ChainPhase::Idle {
                debug!("Mining cycle already {}, skipping", state.phase());
                return Ok(None);
            }
            if state.mempool().is_empty() {
                debug!("Mempool is empty, nothing to mine");
                return Ok(None);
            }

            let template = state.assemble_template(
                &self.config,
                self.fingerprint.as_ref(),
                &mut rand::thread_rng(),
            )?;
            let cancel = self.progress.begin(template.height);
            (template, cancel)
        };

        info!(
            "Mining block {} with difficulty {} ({} transactions, {} fingerprint)...",
            template.height,
            template.difficulty,
            template.transactions.len(),
            self.fingerprint.name()
        );

        let started = Instant::now();
        let header = template.header_bytes();
        let difficulty = template.difficulty;
        let max_attempts = self.config.max_attempts;
        let batch = self.config.progress_batch;
        let fingerprint = Arc::clone(&self.fingerprint);
        let progress = Arc::clone(&self.progress);

        // CPU-bound, no lock held
        let outcome = tokio::task::spawn_blocking(move || {
            search(
                &header,
                difficulty,
                max_attempts,
                batch,
                fingerprint.as_ref(),
                &cancel,
                |attempts| {
                    progress.record(&cancel, attempts);
                    debug!("⛏️  {} attempts", attempts);
                },
            )
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut state = self.state.write().await;
        if state.epoch() != template.epoch {
            info!(
                "Network was reset while mining block {}, discarding result",
                template.height
            );
            return Ok(None);
        }
        self.progress.finish();

        let result = match outcome {
            Ok(Ok(result)) if result.success => result,
            Ok(Ok(result)) => {
                warn!(
                    "Mining attempt exhausted for block {} after {} attempts",
                    template.height, result.attempts
                );
                state.discard_template(&template);
                return Err(MiningError::Exhausted {
                    attempts: result.attempts,
                }
                .into());
            }
            Ok(Err(e)) => {
                warn!("Mining block {} stopped: {}", template.height, e);
                state.discard_template(&template);
                return Err(e.into());
            }
            Err(e) => {
                state.discard_template(&template);
                return Err(MiningError::TaskFailed(e.to_string()).into());
            }
        };

        let block = state.commit_block(&template, &result, elapsed_ms)?;
        info!(
            "Block {} mined in {}ms ({} attempts)",
            block.height, elapsed_ms, result.attempts
        );
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::amount::Amount;
    use crate::crypto::{Sha256Fingerprint, SimulatedFingerprint};
    use crate::wallet::WalletId;

    fn miner_with(config: SimulatorConfig, fingerprint: Arc<dyn Fingerprint>) -> Miner {
        let state = Arc::new(RwLock::new(LedgerState::genesis(config.history_capacity)));
        Miner::with_fingerprint(state, Arc::new(config), fingerprint)
    }

    async fn queue_transfer(miner: &Miner) {
        let mut state = miner.state().write().await;
        let fee = miner.config().transfer_fee;
        state
            .submit_wallet_transfer(
                WalletId::Wallet1,
                WalletId::Wallet2,
                Amount::from_btc(30),
                fee,
                miner.fingerprint(),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_mine_next_block() {
        let miner = miner_with(SimulatorConfig::default(), Arc::new(SimulatedFingerprint));
        queue_transfer(&miner).await;

        let block = miner.mine_next_block().await.unwrap().unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(block.tx_count(), 2);
        assert!(block.attempts.unwrap() >= 1);
        assert!(block.hash_rate.unwrap() > 0.0);
        assert!(!miner.progress().is_active());
        assert_eq!(miner.progress().height(), 1);

        let state = miner.state().read().await;
        assert_eq!(state.chain().len(), 1);
        assert!(state.mempool().is_empty());
        assert_eq!(
            state.balance_of(WalletId::Wallet1).unwrap(),
            Amount::parse_btc("69.99").unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_mempool_is_noop() {
        let miner = miner_with(SimulatorConfig::default(), Arc::new(SimulatedFingerprint));
        assert_eq!(miner.mine_next_block().await.unwrap(), None);
        assert!(miner.state().read().await.chain().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_cycles_mine_one_block() {
        let miner = miner_with(SimulatorConfig::default(), Arc::new(SimulatedFingerprint));
        queue_transfer(&miner).await;

        let (first, second) = tokio::join!(miner.mine_next_block(), miner.mine_next_block());
        let mined = [first.unwrap(), second.unwrap()]
            .iter()
            .filter(|b| b.is_some())
            .count();

        assert_eq!(mined, 1);
        assert_eq!(miner.state().read().await.chain().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_search_leaves_state_untouched() {
        let config = SimulatorConfig {
            starting_difficulty: 8.0,
            max_attempts: 50,
            progress_batch: 20,
            ..SimulatorConfig::default()
        };
        let miner = miner_with(config, Arc::new(Sha256Fingerprint));
        queue_transfer(&miner).await;
        let counter = miner.state().read().await.tx_counter();

        let result = miner.mine_next_block().await;
        assert_eq!(
            result,
            Err(MinerError::Mining(MiningError::Exhausted { attempts: 50 }))
        );
        assert_eq!(miner.progress().attempts(), 50);

        let state = miner.state().read().await;
        assert_eq!(state.phase(), ChainPhase::Idle);
        assert!(state.chain().is_empty());
        assert_eq!(state.mempool().len(), 1);
        assert_eq!(state.tx_counter(), counter);
        assert_eq!(
            state.balance_of(WalletId::Wallet1).unwrap(),
            Amount::from_btc(100)
        );
    }

    #[test]
    fn test_cancel_only_reaches_current_search() {
        let progress = MiningProgress::new();
        let old = progress.begin(1);
        progress.cancel();
        assert!(old.load(Ordering::Relaxed));
        assert!(!progress.is_active());

        let new = progress.begin(2);
        assert!(!new.load(Ordering::Relaxed));
        assert!(old.load(Ordering::Relaxed));
        assert!(progress.is_active());
    }

    #[test]
    fn test_cancelled_search_no_longer_reports() {
        let progress = MiningProgress::new();
        let old = progress.begin(1);
        progress.record(&old, 500);
        progress.cancel();

        let new = progress.begin(1);
        progress.record(&old, 1000);
        assert_eq!(progress.attempts(), 0);

        progress.record(&new, 40);
        assert_eq!(progress.attempts(), 40);
    }
}
