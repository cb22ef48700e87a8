//! Chain and mempool management
//!
//! Drives the mining cycle state machine on a [`LedgerState`]:
//! `Idle -> AssemblingBlock -> Mining -> Committing -> Idle`. The chain
//! manager is the only writer of the block sequence; committing a block is
//! all or nothing.

use crate::analytics::NetworkDataPoint;
use crate::config::SimulatorConfig;
use crate::core::amount::Amount;
use crate::core::block::{Block, BlockTemplate};
use crate::core::state::{ChainPhase, LedgerState, StateSnapshot};
use crate::core::transaction::{build_coinbase, build_transfer, Transaction, TransactionError};
use crate::core::utxo::LedgerError;
use crate::core::validator::choose_miner;
use crate::crypto::Fingerprint;
use crate::mining::mempool::MempoolError;
use crate::mining::pow::{
    current_difficulty_with, estimate_hash_rate, meets_target, target_for, MiningResult,
    RetargetParams,
};
use crate::wallet::{WalletError, WalletId};
use chrono::Utc;
use log::{error, info};
use rand::Rng;
use thiserror::Error;

/// Chain manager errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Mempool error: {0}")]
    Mempool(#[from] MempoolError),
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("A mining cycle is already {0}")]
    Busy(ChainPhase),
    #[error("Mempool is empty")]
    EmptyMempool,
    #[error("No active validator")]
    NoActiveValidator,
    #[error("Template from epoch {template} is stale (current epoch {current})")]
    StaleTemplate { template: u64, current: u64 },
    #[error("Invalid proof: {0}")]
    InvalidProof(String),
    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

impl LedgerState {
    /// Build a transfer between addresses and queue it in the mempool.
    ///
    /// Outputs already claimed by pending transactions are not selected
    /// again. Nothing changes on failure.
    pub fn submit_transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: Amount,
        fee: Amount,
        fingerprint: &dyn Fingerprint,
    ) -> Result<Transaction, ChainError> {
        let reserved = self.mempool.reserved_outpoints();
        let tx = build_transfer(
            &self.ledger,
            &reserved,
            self.tx_counter,
            from,
            to,
            amount,
            fee,
            fingerprint,
        )?;

        self.mempool.add_transaction(tx.clone())?;
        self.next_tx_id();
        Ok(tx)
    }

    /// [`submit_transfer`](Self::submit_transfer) between two wallets
    pub fn submit_wallet_transfer(
        &mut self,
        from: WalletId,
        to: WalletId,
        amount: Amount,
        fee: Amount,
        fingerprint: &dyn Fingerprint,
    ) -> Result<Transaction, ChainError> {
        let from = self.wallet(from)?.address.clone();
        let to = self.wallet(to)?.address.clone();
        self.submit_transfer(&from, &to, amount, fee, fingerprint)
    }

    /// Start a mining cycle: pick the winning validator and build the
    /// template (coinbase plus the oldest mempool transactions).
    pub fn assemble_template<R: Rng + ?Sized>(
        &mut self,
        config: &SimulatorConfig,
        fingerprint: &dyn Fingerprint,
        rng: &mut R,
    ) -> Result<BlockTemplate, ChainError> {
        if self.phase != ChainPhase::Idle {
            return Err(ChainError::Busy(self.phase));
        }
        if self.mempool.is_empty() {
            return Err(ChainError::EmptyMempool);
        }
        self.phase = ChainPhase::AssemblingBlock;

        let miner = match choose_miner(&self.validators, rng) {
            Some(miner) => (miner.id, miner.address.clone()),
            None => {
                self.phase = ChainPhase::Idle;
                return Err(ChainError::NoActiveValidator);
            }
        };

        let selected = self.mempool.take_batch(config.block_batch_size);
        let fees: Amount = selected.iter().map(|tx| tx.fee).sum();
        let height = self.chain.len() as u64 + 1;

        let coinbase_id = self.next_tx_id();
        let draft = build_coinbase(coinbase_id, &miner.1, config.block_reward);
        let reward = draft.reward() + fees;
        let coinbase = draft.finalize(reward, fingerprint);

        let mut transactions = Vec::with_capacity(selected.len() + 1);
        transactions.push(coinbase);
        transactions.extend(selected);

        let difficulty = current_difficulty_with(&self.chain, &RetargetParams::from(config));
        let template = BlockTemplate {
            height,
            previous_hash: self.tip_hash().to_string(),
            timestamp: Utc::now(),
            transactions,
            miner_id: miner.0,
            difficulty,
            target: target_for(difficulty),
            reward,
            epoch: self.epoch,
        };

        self.pending = Some(template.clone());
        self.phase = ChainPhase::Mining;
        Ok(template)
    }

    /// Drop a template whose search did not produce a block. Mempool and
    /// ledger are untouched.
    pub fn discard_template(&mut self, template: &BlockTemplate) {
        if template.epoch == self.epoch && self.phase == ChainPhase::Mining {
            self.release_template(template);
        }
    }

    /// Back to `Idle`, handing the coinbase id back to the counter. When
    /// transfers were queued while mining the id stays unused.
    fn release_template(&mut self, template: &BlockTemplate) {
        if let Some(coinbase) = template.transactions.first() {
            if coinbase.is_coinbase() && self.tx_counter == coinbase.id + 1 {
                self.tx_counter = coinbase.id;
            }
        }
        self.pending = None;
        self.phase = ChainPhase::Idle;
    }

    /// Apply a successful proof: spend and create outputs, append the
    /// block, prune the mempool, credit the validator and record analytics.
    pub fn commit_block(
        &mut self,
        template: &BlockTemplate,
        proof: &MiningResult,
        mining_duration_ms: u64,
    ) -> Result<Block, ChainError> {
        if template.epoch != self.epoch {
            return Err(ChainError::StaleTemplate {
                template: template.epoch,
                current: self.epoch,
            });
        }
        if self.phase != ChainPhase::Mining {
            return Err(ChainError::InvalidChain(format!(
                "cannot commit while {}",
                self.phase
            )));
        }
        if !proof.success || !meets_target(&proof.hash, &template.target) {
            self.discard_template(template);
            return Err(ChainError::InvalidProof(format!(
                "hash {} does not meet target {}",
                proof.hash, template.target
            )));
        }
        if template.height != self.chain.len() as u64 + 1
            || template.previous_hash != self.tip_hash()
        {
            self.discard_template(template);
            return Err(ChainError::InvalidChain(format!(
                "template for height {} does not extend the tip",
                template.height
            )));
        }

        self.phase = ChainPhase::Committing;

        // regular transactions first, coinbase last
        let regular = template.transactions.get(1..).unwrap_or_default();
        let mut ordered: Vec<Transaction> = regular.to_vec();
        ordered.extend(template.transactions.first().cloned());

        if let Err(e) = self.ledger.apply_block(&ordered, template.height) {
            error!("Aborting commit of block {}: {}", template.height, e);
            self.release_template(template);
            return Err(e.into());
        }

        let block = Block {
            height: template.height,
            hash: proof.hash.clone(),
            previous_hash: template.previous_hash.clone(),
            timestamp: template.timestamp,
            transactions: template.transactions.clone(),
            miner_id: template.miner_id,
            nonce: proof.nonce,
            difficulty: template.difficulty,
            target: template.target.clone(),
            reward: template.reward,
            mining_duration_ms: Some(mining_duration_ms),
            attempts: Some(proof.attempts),
            hash_rate: Some(estimate_hash_rate(template.difficulty, mining_duration_ms)),
        };
        self.chain.push(block.clone());

        let committed: Vec<u64> = regular.iter().map(|tx| tx.id).collect();
        self.mempool.remove_committed(&committed);

        if let Some(validator) = self
            .validators
            .iter_mut()
            .find(|v| v.id == template.miner_id)
        {
            validator.blocks_won += 1;
        }

        if let Some(point) = NetworkDataPoint::collect(&self.chain, &self.mempool) {
            self.history.push(point);
        }

        self.pending = None;
        self.phase = ChainPhase::Idle;

        info!(
            "Block {} committed: {} txs, reward {}, difficulty {}, {} attempts",
            block.height,
            block.tx_count(),
            block.reward,
            block.difficulty,
            proof.attempts
        );

        Ok(block)
    }

    /// Return everything to genesis. Any template in flight becomes stale.
    pub fn reset(&mut self) -> Result<(), ChainError> {
        if self.phase == ChainPhase::Committing {
            return Err(ChainError::Busy(self.phase));
        }

        let capacity = self.history.capacity();
        let epoch = self.epoch + 1;
        *self = LedgerState::from_snapshot(StateSnapshot::genesis(), capacity)?;
        self.epoch = epoch;

        info!("Network reset to genesis (epoch {})", epoch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Sha256Fingerprint, SimulatedFingerprint};
    use crate::mining::pow::ProofSearch;

    fn config() -> SimulatorConfig {
        SimulatorConfig::default()
    }

    fn address(state: &LedgerState, id: WalletId) -> String {
        state.wallet(id).unwrap().address.clone()
    }

    fn mine(state: &mut LedgerState) -> Result<Block, ChainError> {
        let fp = SimulatedFingerprint;
        let template = state.assemble_template(&config(), &fp, &mut rand::thread_rng())?;
        let mut search = ProofSearch::new(template.header_bytes(), template.difficulty, 100_000);
        let proof = search.run_batch(&fp, 100_000).unwrap();
        state.commit_block(&template, &proof, 25)
    }

    #[test]
    fn test_transfer_then_commit() {
        let mut state = LedgerState::genesis(50);
        let fee = config().transfer_fee;
        state
            .submit_wallet_transfer(
                WalletId::Wallet1,
                WalletId::Wallet2,
                Amount::from_btc(30),
                fee,
                &SimulatedFingerprint,
            )
            .unwrap();
        assert_eq!(state.mempool().len(), 1);
        assert_eq!(state.tx_counter(), 2);

        let block = mine(&mut state).unwrap();

        assert_eq!(block.height, 1);
        assert_eq!(block.previous_hash, "0x0000000000000000");
        assert!(block.coinbase_tx().is_some());
        assert_eq!(block.reward, Amount::from_cents(625) + fee);
        assert!(state.mempool().is_empty());
        assert_eq!(
            state.balance_of(WalletId::Wallet1).unwrap(),
            Amount::parse_btc("69.99").unwrap()
        );
        assert_eq!(
            state.balance_of(WalletId::Wallet2).unwrap(),
            Amount::from_btc(80)
        );
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.phase(), ChainPhase::Idle);

        let won: u64 = state.validators().iter().map(|v| v.blocks_won).sum();
        assert_eq!(won, 1);
    }

    #[test]
    fn test_block_conserves_value() {
        let mut state = LedgerState::genesis(50);
        let fee = config().transfer_fee;
        for (from, to, btc) in [
            (WalletId::Wallet1, WalletId::Wallet2, 10),
            (WalletId::Wallet2, WalletId::Wallet3, 5),
            (WalletId::Wallet3, WalletId::Wallet1, 1),
        ] {
            state
                .submit_wallet_transfer(from, to, Amount::from_btc(btc), fee, &SimulatedFingerprint)
                .unwrap();
        }

        let block = mine(&mut state).unwrap();
        assert_eq!(block.tx_count(), 4);
        // fees move from senders to the coinbase, only the subsidy is new
        assert_eq!(
            block.total_created() + block.total_fees(),
            block.total_spent() + block.reward
        );
        assert_eq!(
            block.total_created().sats() - block.total_spent().sats(),
            config().block_reward.sats()
        );
        assert_eq!(block.total_fees(), Amount::from_cents(3));
    }

    #[test]
    fn test_batch_takes_oldest_three() {
        let mut state = LedgerState::genesis(50);
        let fee = config().transfer_fee;
        let fp = SimulatedFingerprint;
        state
            .submit_wallet_transfer(WalletId::Wallet1, WalletId::Wallet2, Amount::from_btc(10), fee, &fp)
            .unwrap();
        mine(&mut state).unwrap();

        // wallet2 now holds two outputs, so four transfers can be pending
        let mut ids = Vec::new();
        for (from, to) in [
            (WalletId::Wallet2, WalletId::Wallet3),
            (WalletId::Wallet2, WalletId::Wallet3),
            (WalletId::Wallet1, WalletId::Wallet3),
            (WalletId::Wallet3, WalletId::Wallet1),
        ] {
            let tx = state
                .submit_wallet_transfer(from, to, Amount::from_btc(1), fee, &fp)
                .unwrap();
            ids.push(tx.id);
        }
        assert_eq!(state.mempool().len(), 4);

        let block = mine(&mut state).unwrap();
        let included: Vec<u64> = block.regular_transactions().map(|tx| tx.id).collect();
        assert_eq!(included, ids[..3].to_vec());
        assert_eq!(state.mempool().len(), 1);
        assert!(state.mempool().contains(ids[3]));
    }

    #[test]
    fn test_pending_outputs_are_reserved() {
        let mut state = LedgerState::genesis(50);
        let fee = config().transfer_fee;
        state
            .submit_wallet_transfer(
                WalletId::Wallet3,
                WalletId::Wallet1,
                Amount::from_btc(1),
                fee,
                &SimulatedFingerprint,
            )
            .unwrap();

        // wallet3's only output is claimed until the block commits
        let second = state.submit_wallet_transfer(
            WalletId::Wallet3,
            WalletId::Wallet1,
            Amount::from_btc(1),
            fee,
            &SimulatedFingerprint,
        );
        assert!(matches!(
            second,
            Err(ChainError::Transaction(TransactionError::InsufficientFunds { .. }))
        ));
        assert_eq!(state.mempool().len(), 1);
        assert_eq!(state.tx_counter(), 2);

        mine(&mut state).unwrap();
        state
            .submit_wallet_transfer(
                WalletId::Wallet3,
                WalletId::Wallet1,
                Amount::from_btc(1),
                fee,
                &SimulatedFingerprint,
            )
            .unwrap();
    }

    #[test]
    fn test_second_cycle_rejected_while_mining() {
        let mut state = LedgerState::genesis(50);
        state
            .submit_wallet_transfer(
                WalletId::Wallet1,
                WalletId::Wallet2,
                Amount::from_btc(1),
                config().transfer_fee,
                &SimulatedFingerprint,
            )
            .unwrap();

        let fp = SimulatedFingerprint;
        state
            .assemble_template(&config(), &fp, &mut rand::thread_rng())
            .unwrap();
        assert_eq!(state.phase(), ChainPhase::Mining);
        assert!(state.pending_template().is_some());

        assert_eq!(
            state
                .assemble_template(&config(), &fp, &mut rand::thread_rng())
                .unwrap_err(),
            ChainError::Busy(ChainPhase::Mining)
        );
    }

    #[test]
    fn test_empty_mempool_rejected() {
        let mut state = LedgerState::genesis(50);
        let result = state.assemble_template(&config(), &SimulatedFingerprint, &mut rand::thread_rng());
        assert_eq!(result.unwrap_err(), ChainError::EmptyMempool);
        assert_eq!(state.phase(), ChainPhase::Idle);
    }

    #[test]
    fn test_discard_leaves_state_untouched() {
        let mut state = LedgerState::genesis(50);
        state
            .submit_wallet_transfer(
                WalletId::Wallet1,
                WalletId::Wallet2,
                Amount::from_btc(1),
                config().transfer_fee,
                &Sha256Fingerprint,
            )
            .unwrap();
        let balance = state.balance_of(WalletId::Wallet1).unwrap();
        let counter = state.tx_counter();

        let template = state
            .assemble_template(&config(), &Sha256Fingerprint, &mut rand::thread_rng())
            .unwrap();
        assert_eq!(state.tx_counter(), counter + 1);
        let mut search = ProofSearch::new(template.header_bytes(), 15.0, 10);
        let miss = search.run_batch(&Sha256Fingerprint, 100).unwrap();
        assert!(!miss.success);

        assert!(matches!(
            state.commit_block(&template, &miss, 5),
            Err(ChainError::InvalidProof(_))
        ));
        assert_eq!(state.phase(), ChainPhase::Idle);
        assert!(state.chain().is_empty());
        assert_eq!(state.mempool().len(), 1);
        assert_eq!(state.balance_of(WalletId::Wallet1).unwrap(), balance);
        assert_eq!(state.tx_counter(), counter);
    }

    #[test]
    fn test_invariant_violation_aborts_commit() {
        let mut state = LedgerState::genesis(50);
        state
            .submit_wallet_transfer(
                WalletId::Wallet1,
                WalletId::Wallet2,
                Amount::from_btc(1),
                config().transfer_fee,
                &SimulatedFingerprint,
            )
            .unwrap();

        let fp = SimulatedFingerprint;
        let mut template = state
            .assemble_template(&config(), &fp, &mut rand::thread_rng())
            .unwrap();
        // smuggle a duplicate spend into the template
        let mut duplicate = template.transactions[1].clone();
        duplicate.id = 999;
        template.transactions.push(duplicate);

        let proof = ProofSearch::new(template.header_bytes(), template.difficulty, 10)
            .run_batch(&fp, 10)
            .unwrap();
        let outputs_before = state.ledger().outputs().to_vec();

        assert!(matches!(
            state.commit_block(&template, &proof, 5),
            Err(ChainError::Ledger(LedgerError::InvariantViolation(_)))
        ));
        assert_eq!(state.ledger().outputs(), outputs_before.as_slice());
        assert!(state.chain().is_empty());
        assert_eq!(state.mempool().len(), 1);
        assert_eq!(state.phase(), ChainPhase::Idle);
    }

    #[test]
    fn test_reset_makes_template_stale() {
        let mut state = LedgerState::genesis(50);
        state
            .submit_wallet_transfer(
                WalletId::Wallet1,
                WalletId::Wallet2,
                Amount::from_btc(1),
                config().transfer_fee,
                &SimulatedFingerprint,
            )
            .unwrap();
        let fp = SimulatedFingerprint;
        let template = state
            .assemble_template(&config(), &fp, &mut rand::thread_rng())
            .unwrap();
        let proof = ProofSearch::new(template.header_bytes(), template.difficulty, 10)
            .run_batch(&fp, 10)
            .unwrap();

        state.reset().unwrap();
        assert_eq!(state.epoch(), 1);
        assert_eq!(state.phase(), ChainPhase::Idle);
        assert!(state.mempool().is_empty());

        assert!(matches!(
            state.commit_block(&template, &proof, 5),
            Err(ChainError::StaleTemplate { template: 0, current: 1 })
        ));
        assert!(state.chain().is_empty());
        assert_eq!(
            state.balance_of(WalletId::Wallet1).unwrap(),
            Amount::from_btc(100)
        );
    }

    #[test]
    fn test_chain_links_and_counters() {
        let mut state = LedgerState::genesis(50);
        let from = address(&state, WalletId::Wallet1);
        let to = address(&state, WalletId::Wallet2);
        for _ in 0..3 {
            state
                .submit_transfer(&from, &to, Amount::from_btc(2), config().transfer_fee, &SimulatedFingerprint)
                .unwrap();
            mine(&mut state).unwrap();
        }

        let chain = state.chain();
        assert_eq!(chain.len(), 3);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash);
            assert_eq!(pair[1].height, pair[0].height + 1);
        }

        // every output spent at most once and balances match the ledger
        for output in state.ledger().outputs() {
            assert_eq!(output.spent, output.spending_transaction_id.is_some());
        }
        let supply: Amount = WalletId::ALL
            .iter()
            .map(|id| state.balance_of(*id).unwrap())
            .sum::<Amount>()
            + state
                .validators()
                .iter()
                .map(|v| state.ledger().balance_of(&v.address))
                .sum::<Amount>();
        assert_eq!(supply, state.ledger().total_unspent());
        assert_eq!(
            state.ledger().total_unspent(),
            Amount::from_btc(175) + Amount::from_cents(625 * 3)
        );
    }
}
