//! Block implementation for the ledger
//!
//! A block is assembled from a [`BlockTemplate`] once the mining engine
//! has found a proof for it.

use crate::core::amount::Amount;
use crate::core::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Previous-hash sentinel for the first block
pub const GENESIS_PREVIOUS_HASH: &str = "0x0000000000000000";

/// Everything the mining engine needs to search for a proof.
///
/// Immutable once handed to the search; the chain manager keeps the
/// transactions so it can commit them after the proof comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub height: u64,
    pub previous_hash: String,
    pub timestamp: DateTime<Utc>,
    /// Coinbase first, then the selected mempool transactions
    pub transactions: Vec<Transaction>,
    /// Winning validator
    pub miner_id: u32,
    pub difficulty: f64,
    pub target: String,
    pub reward: Amount,
    /// State epoch the template was assembled in
    pub epoch: u64,
}

impl BlockTemplate {
    pub fn transaction_hashes(&self) -> Vec<&str> {
        self.transactions.iter().map(|tx| tx.hash.as_str()).collect()
    }

    /// Stable serialization searched over by the proof of work
    pub fn header_bytes(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}|",
            self.height,
            self.previous_hash,
            self.timestamp.timestamp_millis(),
            self.transaction_hashes().join(","),
            self.miner_id
        )
        .into_bytes()
    }

}

/// A committed block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub miner_id: u32,
    pub nonce: u64,
    pub difficulty: f64,
    pub target: String,
    /// Coinbase amount (block reward plus collected fees)
    pub reward: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mining_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_rate: Option<f64>,
}

impl Block {
    /// Get the coinbase transaction (first transaction)
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Regular transactions carried by the block
    pub fn regular_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| !tx.is_coinbase())
    }

    /// Get the total transaction fees in this block
    pub fn total_fees(&self) -> Amount {
        self.regular_transactions().map(|tx| tx.fee).sum()
    }

    /// Sum of all outputs created by the block
    pub fn total_created(&self) -> Amount {
        self.transactions.iter().map(|tx| tx.total_output()).sum()
    }

    /// Sum of all inputs spent by the block
    pub fn total_spent(&self) -> Amount {
        self.transactions.iter().map(|tx| tx.input_total).sum()
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::build_coinbase;
    use crate::crypto::Sha256Fingerprint;

    fn template(miner_id: u32) -> BlockTemplate {
        let coinbase = build_coinbase(1, "miner", Amount::ZERO)
            .finalize(Amount::from_cents(625), &Sha256Fingerprint);
        BlockTemplate {
            height: 1,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            timestamp: Utc::now(),
            transactions: vec![coinbase],
            miner_id,
            difficulty: 4.0,
            target: String::new(),
            reward: Amount::from_cents(625),
            epoch: 0,
        }
    }

    #[test]
    fn test_header_bytes_are_stable() {
        let t = template(1);
        assert_eq!(t.header_bytes(), t.header_bytes());
        let text = String::from_utf8(t.header_bytes()).unwrap();
        assert!(text.starts_with("1|0x0000000000000000|"));
        assert!(text.ends_with("|1|"));
    }

    #[test]
    fn test_header_bytes_depend_on_miner() {
        let a = template(1);
        let mut b = a.clone();
        b.miner_id = 2;
        assert_ne!(a.header_bytes(), b.header_bytes());
    }
}
