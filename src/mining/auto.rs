//! Automatic mining
//!
//! A background task that keeps the network busy: every interval it queues
//! a few synthetic transfers between the default wallets, waits a moment,
//! then starts a mining cycle unless one is already running.

use crate::core::amount::Amount;
use crate::mining::miner::Miner;
use crate::wallet::WalletId;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A generated transfer between two default wallets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticTransfer {
    pub from: WalletId,
    pub to: WalletId,
    pub amount: Amount,
}

/// Draw between `min` and `max` transfers, each between two distinct
/// wallets for 1 to 10 BTC in whole cents.
pub fn synthetic_transfers<R: Rng>(
    rng: &mut R,
    min: usize,
    max: usize,
) -> Vec<SyntheticTransfer> {
    let count = rng.gen_range(min..=max.max(min));
    (0..count)
        .filter_map(|_| {
            let pair: Vec<WalletId> = WalletId::ALL.choose_multiple(rng, 2).copied().collect();
            match pair.as_slice() {
                [from, to] => Some(SyntheticTransfer {
                    from: *from,
                    to: *to,
                    amount: Amount::from_cents(rng.gen_range(100..=1000)),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Handle to the running driver
#[derive(Debug)]
pub struct AutoMiner {
    token: CancellationToken,
    handle: JoinHandle<()>,
    cycles: TaskTracker,
}

impl AutoMiner {
    /// Spawn the driver. Must be called from within a tokio runtime.
    pub fn start(miner: Miner) -> Self {
        let token = CancellationToken::new();
        let cycles = TaskTracker::new();
        let handle = tokio::spawn(run(miner, token.clone(), cycles.clone()));
        info!("Automatic mining started");
        Self {
            token,
            handle,
            cycles,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }

    /// Stop the driver. A mining cycle it already started runs to
    /// completion in its own task.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop the driver and wait for it to exit, along with every mining
    /// cycle it started
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Automatic mining task ended abnormally: {}", e);
        }
        self.cycles.close();
        self.cycles.wait().await;
    }
}

async fn run(miner: Miner, token: CancellationToken, cycles: TaskTracker) {
    let mut ticker = time::interval(miner.config().auto_mining_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        inject_transfers(&miner).await;

        tokio::select! {
            _ = token.cancelled() => break,
            _ = time::sleep(miner.config().auto_mining_delay()) => {}
        }

        let cycle = miner.clone();
        cycles.spawn(async move {
            match cycle.mine_next_block().await {
                Ok(Some(block)) => info!("⛏️  Auto-mined block {}", block.height),
                Ok(None) => debug!("Auto-mining skipped this round"),
                Err(e) => warn!("Auto-mining cycle failed: {}", e),
            }
        });
    }

    info!("Automatic mining stopped");
}

async fn inject_transfers(miner: &Miner) {
    let config = miner.config();
    let transfers = synthetic_transfers(
        &mut rand::thread_rng(),
        config.auto_mining_min_txs,
        config.auto_mining_max_txs,
    );

    let mut state = miner.state().write().await;
    for transfer in transfers {
        match state.submit_wallet_transfer(
            transfer.from,
            transfer.to,
            transfer.amount,
            config.transfer_fee,
            miner.fingerprint(),
        ) {
            Ok(tx) => debug!(
                "Synthetic transfer {}: {} {} -> {}",
                tx.id, transfer.amount, transfer.from, transfer.to
            ),
            Err(e) => debug!(
                "Skipping synthetic transfer {} -> {}: {}",
                transfer.from, transfer.to, e
            ),
        }
    }
}
