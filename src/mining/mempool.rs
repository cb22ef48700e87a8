//! Transaction pool (mempool) for pending transactions
//!
//! Holds regular transactions in arrival order. Mining takes a batch from
//! the front (oldest first); displays usually want newest first.

use crate::core::amount::Amount;
use crate::core::utxo::OutPoint;
use crate::core::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Mempool errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MempoolError {
    #[error("Transaction already exists: {0}")]
    DuplicateTransaction(u64),
    #[error("Coinbase transactions cannot enter the mempool")]
    CoinbaseRejected,
    #[error("Input {0} is already spent by a pending transaction")]
    ConflictingInput(OutPoint),
}

/// Memory pool for pending transactions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mempool {
    /// Front is the oldest transaction
    pending: VecDeque<Transaction>,
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction at the back of the pool
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), MempoolError> {
        if tx.is_coinbase() {
            return Err(MempoolError::CoinbaseRejected);
        }
        if self.contains(tx.id) {
            return Err(MempoolError::DuplicateTransaction(tx.id));
        }

        let reserved = self.reserved_outpoints();
        if let Some(input) = tx.inputs.iter().find(|i| reserved.contains(&i.outpoint())) {
            return Err(MempoolError::ConflictingInput(input.outpoint()));
        }

        self.pending.push_back(tx);
        Ok(())
    }

    pub fn contains(&self, tx_id: u64) -> bool {
        self.pending.iter().any(|tx| tx.id == tx_id)
    }

    /// Up to `limit` oldest transactions, in arrival order
    pub fn take_batch(&self, limit: usize) -> Vec<Transaction> {
        self.pending.iter().take(limit).cloned().collect()
    }

    /// Remove transactions that were committed in a block
    pub fn remove_committed(&mut self, ids: &[u64]) -> usize {
        let before = self.pending.len();
        self.pending.retain(|tx| !ids.contains(&tx.id));
        before - self.pending.len()
    }

    /// Outputs claimed by pending transactions
    pub fn reserved_outpoints(&self) -> HashSet<OutPoint> {
        self.pending
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|i| i.outpoint()))
            .collect()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.pending.iter()
    }

    /// Newest first, for display
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Transaction> {
        self.pending.iter().rev()
    }

    pub fn total_fees(&self) -> Amount {
        self.pending.iter().map(|tx| tx.fee).sum()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{build_coinbase, TransactionBuilder};
    use crate::core::utxo::UnspentOutput;
    use crate::crypto::Sha256Fingerprint;

    fn pending_tx(id: u64, source_tx: u64) -> Transaction {
        let utxo = UnspentOutput {
            transaction_id: source_tx,
            output_index: 0,
            address: "alice".to_string(),
            amount: Amount::from_btc(10),
            spent: false,
            spending_transaction_id: None,
            block_height: Some(0),
        };
        TransactionBuilder::new(id)
            .add_input(&utxo)
            .add_output("bob", Amount::from_sats(999_000_000))
            .fee(Amount::from_cents(1))
            .build(&Sha256Fingerprint)
            .unwrap()
    }

    #[test]
    fn test_batch_is_oldest_first() {
        let mut mempool = Mempool::new();
        for id in 1..=5 {
            mempool.add_transaction(pending_tx(id, 100 + id)).unwrap();
        }

        let batch: Vec<u64> = mempool.take_batch(3).iter().map(|tx| tx.id).collect();
        assert_eq!(batch, vec![1, 2, 3]);

        let newest: Vec<u64> = mempool.iter_newest_first().map(|tx| tx.id).collect();
        assert_eq!(newest, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_remove_committed() {
        let mut mempool = Mempool::new();
        for id in 1..=4 {
            mempool.add_transaction(pending_tx(id, 100 + id)).unwrap();
        }

        assert_eq!(mempool.remove_committed(&[1, 2, 3]), 3);
        assert_eq!(mempool.len(), 1);
        assert_eq!(mempool.take_batch(3)[0].id, 4);
    }

    #[test]
    fn test_rejects_duplicates_and_conflicts() {
        let mut mempool = Mempool::new();
        mempool.add_transaction(pending_tx(1, 100)).unwrap();

        assert_eq!(
            mempool.add_transaction(pending_tx(1, 101)),
            Err(MempoolError::DuplicateTransaction(1))
        );
        assert_eq!(
            mempool.add_transaction(pending_tx(2, 100)),
            Err(MempoolError::ConflictingInput(OutPoint::new(100, 0)))
        );
        assert_eq!(mempool.total_fees(), Amount::from_cents(1));
    }

    #[test]
    fn test_rejects_coinbase() {
        let mut mempool = Mempool::new();
        let coinbase =
            build_coinbase(1, "miner", Amount::ZERO).finalize(Amount::from_btc(1), &Sha256Fingerprint);
        assert_eq!(
            mempool.add_transaction(coinbase),
            Err(MempoolError::CoinbaseRejected)
        );
        assert!(mempool.is_empty());
    }
}
