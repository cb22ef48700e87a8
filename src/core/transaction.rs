//! Transaction handling for the ledger
//!
//! Implements the UTXO-style transaction model: regular transfers spend
//! earlier outputs, coinbase transactions issue the block reward.
//! Signatures are placeholder strings, nothing is verified cryptographically.

use crate::core::amount::Amount;
use crate::core::utxo::{OutPoint, UnspentOutput, UtxoLedger};
use crate::crypto::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: Amount, need: Amount },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
}

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// Transaction input (reference to previous output)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionInput {
    /// Id of the transaction that created the spent output
    pub transaction_id: u64,
    /// Index of the output in that transaction
    pub output_index: u32,
    /// Placeholder signature
    pub signature: String,
}

impl TransactionInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.transaction_id, self.output_index)
    }
}

/// Transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Recipient address
    pub address: String,
    /// Amount of coins
    pub amount: Amount,
    /// Position inside the parent transaction, dense from 0
    pub index: u32,
}

/// Kind of transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxKind {
    Regular,
    Coinbase,
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Id allocated from the ledger's transaction counter
    pub id: u64,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    /// Fee paid to the miner (always zero for coinbase)
    pub fee: Amount,
    pub timestamp: DateTime<Utc>,
    /// Opaque fingerprint of the significant fields
    pub hash: String,
    pub kind: TxKind,
    /// Input amounts resolved at build time, kept so conservation can be
    /// checked without the ledger
    #[serde(default)]
    pub input_total: Amount,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.kind == TxKind::Coinbase
    }

    /// Get total output amount
    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    /// Recipient of output 0 (the payee of a transfer)
    pub fn recipient(&self) -> Option<&str> {
        self.outputs.first().map(|o| o.address.as_str())
    }

    /// Stable text serialization of every significant field
    pub fn signing_data(&self) -> String {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|i| format!("{}:{}:{}", i.transaction_id, i.output_index, i.signature))
            .collect();
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|o| format!("{}:{}:{}", o.index, o.address, o.amount.sats()))
            .collect();
        format!(
            "{}|{:?}|{}|{}|{}|{}",
            self.id,
            self.kind,
            inputs.join(","),
            outputs.join(","),
            self.fee.sats(),
            self.timestamp.timestamp_millis()
        )
    }

    /// Calculate the transaction fingerprint
    pub fn calculate_hash(&self, fingerprint: &dyn Fingerprint) -> String {
        fingerprint.digest(self.signing_data().as_bytes())
    }

    /// Check the structural and value-conservation invariants
    pub fn validate(&self) -> Result<(), TransactionError> {
        for (position, output) in self.outputs.iter().enumerate() {
            if output.index as usize != position {
                return Err(TransactionError::InvalidTransaction(format!(
                    "output index {} at position {}",
                    output.index, position
                )));
            }
        }

        match self.kind {
            TxKind::Coinbase => {
                if !self.inputs.is_empty() {
                    return Err(TransactionError::InvalidTransaction(
                        "coinbase must not have inputs".to_string(),
                    ));
                }
                if self.outputs.len() != 1 {
                    return Err(TransactionError::InvalidTransaction(
                        "coinbase must have exactly one output".to_string(),
                    ));
                }
            }
            TxKind::Regular => {
                if self.inputs.is_empty() {
                    return Err(TransactionError::InvalidTransaction(
                        "regular transaction without inputs".to_string(),
                    ));
                }
                let spent = self.total_output().checked_add(self.fee);
                if spent != Some(self.input_total) {
                    return Err(TransactionError::InvalidTransaction(format!(
                        "inputs {} do not equal outputs {} plus fee {}",
                        self.input_total,
                        self.total_output(),
                        self.fee
                    )));
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Coinbase
// =============================================================================

/// A coinbase transaction whose reward has not been fixed yet.
///
/// The reward can be rewritten exactly once: [`CoinbaseDraft::finalize`]
/// consumes the draft and produces the hashed transaction.
#[derive(Debug, Clone)]
pub struct CoinbaseDraft {
    id: u64,
    miner_address: String,
    reward: Amount,
    timestamp: DateTime<Utc>,
}

impl CoinbaseDraft {
    pub fn reward(&self) -> Amount {
        self.reward
    }

    /// Fix the reward and hash the transaction
    pub fn finalize(self, reward: Amount, fingerprint: &dyn Fingerprint) -> Transaction {
        let mut tx = Transaction {
            id: self.id,
            inputs: Vec::new(),
            outputs: vec![TransactionOutput {
                address: self.miner_address,
                amount: reward,
                index: 0,
            }],
            fee: Amount::ZERO,
            timestamp: self.timestamp,
            hash: String::new(),
            kind: TxKind::Coinbase,
            input_total: Amount::ZERO,
        };
        tx.hash = tx.calculate_hash(fingerprint);
        tx
    }
}

/// Create a coinbase (mining reward) transaction draft
pub fn build_coinbase(
    id: u64,
    miner_address: &str,
    reward: Amount,
) -> CoinbaseDraft {
    CoinbaseDraft {
        id,
        miner_address: miner_address.to_string(),
        reward,
        timestamp: Utc::now(),
    }
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for regular transactions
pub struct TransactionBuilder {
    id: u64,
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
    input_total: Amount,
    fee: Amount,
}

impl TransactionBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_total: Amount::ZERO,
            fee: Amount::ZERO,
        }
    }

    /// Add an input spending the given output
    pub fn add_input(mut self, utxo: &UnspentOutput) -> Self {
        self.inputs.push(TransactionInput {
            transaction_id: utxo.transaction_id,
            output_index: utxo.output_index,
            signature: format!("sig:{}:{}", utxo.address, self.id),
        });
        self.input_total += utxo.amount;
        self
    }

    /// Add an output; indices are assigned in call order
    pub fn add_output(mut self, address: &str, amount: Amount) -> Self {
        let index = self.outputs.len() as u32;
        self.outputs.push(TransactionOutput {
            address: address.to_string(),
            amount,
            index,
        });
        self
    }

    pub fn fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    /// Build, hash and validate the transaction
    pub fn build(self, fingerprint: &dyn Fingerprint) -> Result<Transaction, TransactionError> {
        let mut tx = Transaction {
            id: self.id,
            inputs: self.inputs,
            outputs: self.outputs,
            fee: self.fee,
            timestamp: Utc::now(),
            hash: String::new(),
            kind: TxKind::Regular,
            input_total: self.input_total,
        };
        tx.validate()?;
        tx.hash = tx.calculate_hash(fingerprint);
        Ok(tx)
    }
}

// =============================================================================
// Transfers
// =============================================================================

/// Build a transfer of `amount` from `from` to `to` paying `fee`.
///
/// Inputs are chosen first-fit from the sender's unspent outputs, skipping
/// `reserved` ones. Selection can fall short even when the balance looks
/// sufficient, in which case the transfer fails the same way.
#[allow(clippy::too_many_arguments)]
pub fn build_transfer(
    ledger: &UtxoLedger,
    reserved: &HashSet<OutPoint>,
    id: u64,
    from: &str,
    to: &str,
    amount: Amount,
    fee: Amount,
    fingerprint: &dyn Fingerprint,
) -> Result<Transaction, TransactionError> {
    let balance = ledger.balance_of(from);
    let need = amount
        .checked_add(fee)
        .ok_or_else(|| TransactionError::InvalidAmount(format!("{} + {}", amount, fee)))?;

    if amount.is_zero() || need > balance {
        return Err(TransactionError::InsufficientFunds {
            have: balance,
            need,
        });
    }

    let selection = ledger.select_inputs_excluding(from, need, reserved);
    if !selection.covers(need) {
        return Err(TransactionError::InsufficientFunds {
            have: selection.total,
            need,
        });
    }

    let mut builder = TransactionBuilder::new(id);
    for utxo in &selection.chosen {
        builder = builder.add_input(utxo);
    }
    builder = builder.add_output(to, amount).fee(fee);

    // covers(need) guarantees this cannot underflow
    let change = selection.total.checked_sub(need).unwrap_or(Amount::ZERO);
    if !change.is_zero() {
        builder = builder.add_output(from, change);
    }

    builder.build(fingerprint)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Sha256Fingerprint;

    fn utxo(tx: u64, index: u32, amount: Amount) -> UnspentOutput {
        UnspentOutput {
            transaction_id: tx,
            output_index: index,
            address: "alice".to_string(),
            amount,
            spent: false,
            spending_transaction_id: None,
            block_height: Some(0),
        }
    }

    #[test]
    fn test_coinbase_transaction() {
        let draft = build_coinbase(7, "miner", Amount::from_cents(625));
        assert_eq!(draft.reward(), Amount::from_cents(625));

        let tx = draft.finalize(Amount::from_cents(626), &Sha256Fingerprint);
        assert!(tx.is_coinbase());
        assert!(tx.inputs.is_empty());
        assert_eq!(tx.total_output(), Amount::from_cents(626));
        assert_eq!(tx.hash.len(), 64);
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn test_builder_conserves_value() {
        let tx = TransactionBuilder::new(1)
            .add_input(&utxo(0, 0, Amount::from_btc(100)))
            .add_output("bob", Amount::from_btc(30))
            .add_output("alice", Amount::from_sats(6_999_000_000))
            .fee(Amount::from_cents(1))
            .build(&Sha256Fingerprint)
            .unwrap();

        assert_eq!(tx.kind, TxKind::Regular);
        assert_eq!(tx.outputs[0].index, 0);
        assert_eq!(tx.outputs[1].index, 1);
        assert_eq!(tx.input_total, tx.total_output() + tx.fee);
    }

    #[test]
    fn test_builder_rejects_unbalanced() {
        let result = TransactionBuilder::new(1)
            .add_input(&utxo(0, 0, Amount::from_btc(10)))
            .add_output("bob", Amount::from_btc(10))
            .fee(Amount::from_cents(1))
            .build(&Sha256Fingerprint);

        assert!(matches!(
            result,
            Err(TransactionError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_regular_requires_inputs() {
        let result = TransactionBuilder::new(1)
            .add_output("bob", Amount::ZERO)
            .build(&Sha256Fingerprint);
        assert!(result.is_err());
    }

    fn genesis_ledger() -> UtxoLedger {
        let outputs = [("addr100", 100), ("addr50", 50), ("addr25", 25)]
            .iter()
            .enumerate()
            .map(|(i, (address, btc))| UnspentOutput {
                transaction_id: 0,
                output_index: i as u32,
                address: address.to_string(),
                amount: Amount::from_btc(*btc),
                spent: false,
                spending_transaction_id: None,
                block_height: Some(0),
            })
            .collect();
        UtxoLedger::from_outputs(outputs).unwrap()
    }

    #[test]
    fn test_build_transfer_with_change() {
        let ledger = genesis_ledger();
        let tx = build_transfer(
            &ledger,
            &HashSet::new(),
            1,
            "addr100",
            "addr50",
            Amount::from_btc(30),
            Amount::from_cents(1),
            &Sha256Fingerprint,
        )
        .unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].address, "addr50");
        assert_eq!(tx.outputs[0].amount, Amount::from_btc(30));
        assert_eq!(tx.outputs[1].address, "addr100");
        assert_eq!(tx.outputs[1].amount, Amount::parse_btc("69.99").unwrap());
        assert_eq!(tx.fee, Amount::from_cents(1));
    }

    #[test]
    fn test_build_transfer_exact_has_no_change() {
        let ledger = genesis_ledger();
        let tx = build_transfer(
            &ledger,
            &HashSet::new(),
            1,
            "addr25",
            "addr50",
            Amount::parse_btc("24.99").unwrap(),
            Amount::from_cents(1),
            &Sha256Fingerprint,
        )
        .unwrap();
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn test_build_transfer_insufficient() {
        let ledger = genesis_ledger();
        let result = build_transfer(
            &ledger,
            &HashSet::new(),
            1,
            "addr25",
            "addr50",
            Amount::from_btc(25),
            Amount::from_cents(1),
            &Sha256Fingerprint,
        );
        assert!(matches!(
            result,
            Err(TransactionError::InsufficientFunds { .. })
        ));

        let zero = build_transfer(
            &ledger,
            &HashSet::new(),
            1,
            "addr25",
            "addr50",
            Amount::ZERO,
            Amount::from_cents(1),
            &Sha256Fingerprint,
        );
        assert!(matches!(zero, Err(TransactionError::InsufficientFunds { .. })));
    }

    #[test]
    fn test_build_transfer_fails_when_selection_falls_short() {
        let ledger = genesis_ledger();
        // balance is 100 but the only output is already claimed
        let reserved: HashSet<OutPoint> = [OutPoint::new(0, 0)].into_iter().collect();
        let result = build_transfer(
            &ledger,
            &reserved,
            2,
            "addr100",
            "addr50",
            Amount::from_btc(1),
            Amount::from_cents(1),
            &Sha256Fingerprint,
        );
        assert_eq!(
            result,
            Err(TransactionError::InsufficientFunds {
                have: Amount::ZERO,
                need: Amount::from_sats(101_000_000),
            })
        );
    }

    #[test]
    fn test_hash_changes_with_content() {
        let fp = Sha256Fingerprint;
        let a = build_coinbase(1, "addr1", Amount::ZERO).finalize(Amount::from_btc(1), &fp);
        let mut b = a.clone();
        b.outputs[0].address = "addr2".to_string();
        assert_ne!(a.hash, b.calculate_hash(&fp));
        assert_eq!(a.hash, a.calculate_hash(&fp));
    }
}
