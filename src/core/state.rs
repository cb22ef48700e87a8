//! Ledger state container
//!
//! `LedgerState` owns the chain, the mempool, the UTXO ledger, wallets,
//! validators, the transaction counter and the analytics history. All
//! components operate on it by reference; there are no globals.

use crate::analytics::NetworkHistory;
use crate::core::block::{Block, BlockTemplate, GENESIS_PREVIOUS_HASH};
use crate::core::chain::ChainError;
use crate::core::utxo::UtxoLedger;
use crate::core::validator::{default_validators, Validator};
use crate::core::amount::Amount;
use crate::mining::Mempool;
use crate::wallet::{default_wallets, genesis_outputs, Wallet, WalletError, WalletId, Wallets};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First id handed out by the transaction counter
pub const FIRST_TX_ID: u64 = 1;

/// Where the chain manager is in a mining cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainPhase {
    Idle,
    AssemblingBlock,
    Mining,
    Committing,
}

impl fmt::Display for ChainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainPhase::Idle => "idle",
            ChainPhase::AssemblingBlock => "assembling block",
            ChainPhase::Mining => "mining",
            ChainPhase::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Serializable copy of everything the network persists, one field per
/// storage key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub chain: Vec<Block>,
    pub mempool: Mempool,
    pub wallets: Wallets,
    pub utxos: UtxoLedger,
    pub validators: Vec<Validator>,
    pub tx_counter: u64,
    pub network_history: NetworkHistory,
}

impl StateSnapshot {
    /// Snapshot of a freshly reset network
    pub fn genesis() -> Self {
        let wallets = default_wallets();
        // genesis outputs never collide
        let utxos = UtxoLedger::from_outputs(genesis_outputs(&wallets)).unwrap_or_default();
        Self {
            chain: Vec::new(),
            mempool: Mempool::new(),
            wallets,
            utxos,
            validators: default_validators(),
            tx_counter: FIRST_TX_ID,
            network_history: NetworkHistory::default(),
        }
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::genesis()
    }
}

/// The single owned state of a simulated network
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub(crate) chain: Vec<Block>,
    pub(crate) mempool: Mempool,
    pub(crate) ledger: UtxoLedger,
    pub(crate) wallets: Wallets,
    pub(crate) validators: Vec<Validator>,
    pub(crate) tx_counter: u64,
    pub(crate) history: NetworkHistory,
    pub(crate) phase: ChainPhase,
    /// Bumped on every reset so results of older templates are discarded
    pub(crate) epoch: u64,
    pub(crate) pending: Option<BlockTemplate>,
}

impl LedgerState {
    /// A network at genesis
    pub fn genesis(history_capacity: usize) -> Self {
        let mut state = Self::from_parts(StateSnapshot::genesis(), 0);
        state.history.set_capacity(history_capacity);
        state
    }

    fn from_parts(snapshot: StateSnapshot, epoch: u64) -> Self {
        Self {
            chain: snapshot.chain,
            mempool: snapshot.mempool,
            ledger: snapshot.utxos,
            wallets: snapshot.wallets,
            validators: snapshot.validators,
            tx_counter: snapshot.tx_counter,
            history: snapshot.network_history,
            phase: ChainPhase::Idle,
            epoch,
            pending: None,
        }
    }

    /// Restore from a persisted snapshot, checking that it is coherent
    pub fn from_snapshot(
        mut snapshot: StateSnapshot,
        history_capacity: usize,
    ) -> Result<Self, ChainError> {
        snapshot.utxos.rebuild_index()?;
        verify_links(&snapshot.chain)?;

        let highest_id = snapshot
            .chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .chain(snapshot.mempool.iter())
            .map(|tx| tx.id)
            .max()
            .unwrap_or(0);
        if snapshot.tx_counter <= highest_id {
            return Err(ChainError::InvalidChain(format!(
                "transaction counter {} does not exceed used id {}",
                snapshot.tx_counter, highest_id
            )));
        }

        let mut state = Self::from_parts(snapshot, 0);
        state.history.set_capacity(history_capacity);
        Ok(state)
    }

    /// Copy of the persistable state
    pub fn to_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            chain: self.chain.clone(),
            mempool: self.mempool.clone(),
            wallets: self.wallets.clone(),
            utxos: self.ledger.clone(),
            validators: self.validators.clone(),
            tx_counter: self.tx_counter,
            network_history: self.history.clone(),
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn tip(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Hash the next block must link to
    pub fn tip_hash(&self) -> &str {
        self.tip()
            .map(|b| b.hash.as_str())
            .unwrap_or(GENESIS_PREVIOUS_HASH)
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn ledger(&self) -> &UtxoLedger {
        &self.ledger
    }

    pub fn wallets(&self) -> &Wallets {
        &self.wallets
    }

    pub fn wallet(&self, id: WalletId) -> Result<&Wallet, WalletError> {
        self.wallets
            .get(&id)
            .ok_or_else(|| WalletError::UnknownWallet(id.to_string()))
    }

    /// Balance of a wallet, derived from the ledger
    pub fn balance_of(&self, id: WalletId) -> Result<Amount, WalletError> {
        Ok(self.wallet(id)?.balance(&self.ledger))
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn tx_counter(&self) -> u64 {
        self.tx_counter
    }

    pub fn history(&self) -> &NetworkHistory {
        &self.history
    }

    pub fn phase(&self) -> ChainPhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Template currently being mined, if any
    pub fn pending_template(&self) -> Option<&BlockTemplate> {
        self.pending.as_ref()
    }

    pub(crate) fn next_tx_id(&mut self) -> u64 {
        let id = self.tx_counter;
        self.tx_counter += 1;
        id
    }
}

/// Check heights and previous-hash links of a chain
fn verify_links(chain: &[Block]) -> Result<(), ChainError> {
    let mut previous_hash = GENESIS_PREVIOUS_HASH;
    for (position, block) in chain.iter().enumerate() {
        let expected_height = position as u64 + 1;
        if block.height != expected_height {
            return Err(ChainError::InvalidChain(format!(
                "block at position {} has height {}, expected {}",
                position, block.height, expected_height
            )));
        }
        if block.previous_hash != previous_hash {
            return Err(ChainError::InvalidChain(format!(
                "block {} does not link to its predecessor",
                block.height
            )));
        }
        if block.coinbase_tx().is_none() {
            return Err(ChainError::InvalidChain(format!(
                "block {} does not start with a coinbase",
                block.height
            )));
        }
        previous_hash = &block.hash;
    }
    Ok(())
}
