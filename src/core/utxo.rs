//! UTXO ledger
//!
//! Owns every output the chain has ever created. Outputs are never
//! removed: spending one flips its `spent` flag and records the spender,
//! which keeps the full history auditable. The ledger is the only writer
//! of those flags.

use crate::core::amount::Amount;
use crate::core::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Reference to a single output: `(transaction id, output index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub transaction_id: u64,
    pub output_index: u32,
}

impl OutPoint {
    pub fn new(transaction_id: u64, output_index: u32) -> Self {
        Self {
            transaction_id,
            output_index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

/// An output tracked by the ledger (spent or not)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnspentOutput {
    pub transaction_id: u64,
    pub output_index: u32,
    pub address: String,
    pub amount: Amount,
    pub spent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spending_transaction_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.transaction_id, self.output_index)
    }
}

/// Result of coin selection
#[derive(Debug, Clone, Default)]
pub struct InputSelection {
    pub chosen: Vec<UnspentOutput>,
    pub total: Amount,
}

impl InputSelection {
    /// Whether the selection reaches `target`
    pub fn covers(&self, target: Amount) -> bool {
        self.total >= target
    }
}

/// Append-only output set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtxoLedger {
    outputs: Vec<UnspentOutput>,
    #[serde(skip)]
    index: HashMap<OutPoint, usize>,
}

impl UtxoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger with pre-existing outputs (genesis allocation or a
    /// persisted snapshot)
    pub fn from_outputs(outputs: Vec<UnspentOutput>) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            outputs,
            index: HashMap::new(),
        };
        ledger.rebuild_index()?;
        Ok(ledger)
    }

    /// Rebuild the outpoint index (not serialized)
    pub fn rebuild_index(&mut self) -> Result<(), LedgerError> {
        self.index.clear();
        for (position, output) in self.outputs.iter().enumerate() {
            if output.spent && output.spending_transaction_id.is_none() {
                return Err(LedgerError::InvariantViolation(format!(
                    "output {} is spent without a spender",
                    output.outpoint()
                )));
            }
            if self.index.insert(output.outpoint(), position).is_some() {
                return Err(LedgerError::InvariantViolation(format!(
                    "duplicate output {}",
                    output.outpoint()
                )));
            }
        }
        Ok(())
    }

    /// Full output history in insertion order
    pub fn outputs(&self) -> &[UnspentOutput] {
        &self.outputs
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UnspentOutput> {
        self.index.get(outpoint).map(|&i| &self.outputs[i])
    }

    /// Unspent outputs for an address, in insertion order
    pub fn unspent_outputs_for(&self, address: &str) -> Vec<UnspentOutput> {
        self.outputs
            .iter()
            .filter(|o| !o.spent && o.address == address)
            .cloned()
            .collect()
    }

    /// Balance of an address, always derived from unspent outputs
    pub fn balance_of(&self, address: &str) -> Amount {
        self.outputs
            .iter()
            .filter(|o| !o.spent && o.address == address)
            .map(|o| o.amount)
            .sum()
    }

    /// Circulating supply (all unspent outputs)
    pub fn total_unspent(&self) -> Amount {
        self.outputs
            .iter()
            .filter(|o| !o.spent)
            .map(|o| o.amount)
            .sum()
    }

    /// Greedy first-fit selection over the address's unspent outputs
    pub fn select_inputs(&self, address: &str, target: Amount) -> InputSelection {
        self.select_inputs_excluding(address, target, &HashSet::new())
    }

    /// First-fit selection that skips outputs already reserved by pending
    /// transactions
    pub fn select_inputs_excluding(
        &self,
        address: &str,
        target: Amount,
        reserved: &HashSet<OutPoint>,
    ) -> InputSelection {
        let mut selection = InputSelection::default();

        for output in self
            .outputs
            .iter()
            .filter(|o| !o.spent && o.address == address)
            .filter(|o| !reserved.contains(&o.outpoint()))
        {
            if selection.covers(target) {
                break;
            }
            selection.total += output.amount;
            selection.chosen.push(output.clone());
        }

        selection
    }

    /// Check that every input of `tx` resolves to an existing unspent
    /// output not already claimed in `claimed`
    fn check_inputs(
        &self,
        tx: &Transaction,
        claimed: &mut HashSet<OutPoint>,
    ) -> Result<(), LedgerError> {
        for input in &tx.inputs {
            let outpoint = input.outpoint();
            match self.get(&outpoint) {
                None => {
                    return Err(LedgerError::InvariantViolation(format!(
                        "tx {} spends missing output {}",
                        tx.id, outpoint
                    )))
                }
                Some(output) if output.spent => {
                    return Err(LedgerError::InvariantViolation(format!(
                        "tx {} spends output {} already spent by tx {}",
                        tx.id,
                        outpoint,
                        output.spending_transaction_id.unwrap_or_default()
                    )))
                }
                Some(_) => {}
            }
            if !claimed.insert(outpoint) {
                return Err(LedgerError::InvariantViolation(format!(
                    "output {} is spent twice in the same commit",
                    outpoint
                )));
            }
        }
        Ok(())
    }

    /// Check that `tx` can be applied and does not collide with existing
    /// or already-created outputs
    fn check_transaction(
        &self,
        tx: &Transaction,
        claimed: &mut HashSet<OutPoint>,
        created: &mut HashSet<OutPoint>,
    ) -> Result<(), LedgerError> {
        self.check_inputs(tx, claimed)?;
        for output in &tx.outputs {
            let outpoint = OutPoint::new(tx.id, output.index);
            if self.index.contains_key(&outpoint) || !created.insert(outpoint) {
                return Err(LedgerError::InvariantViolation(format!(
                    "output {} already exists",
                    outpoint
                )));
            }
        }
        Ok(())
    }

    fn apply_unchecked(&mut self, tx: &Transaction, block_height: u64) {
        for input in &tx.inputs {
            if let Some(&position) = self.index.get(&input.outpoint()) {
                let output = &mut self.outputs[position];
                output.spent = true;
                output.spending_transaction_id = Some(tx.id);
            }
        }

        for output in &tx.outputs {
            let record = UnspentOutput {
                transaction_id: tx.id,
                output_index: output.index,
                address: output.address.clone(),
                amount: output.amount,
                spent: false,
                spending_transaction_id: None,
                block_height: Some(block_height),
            };
            self.index.insert(record.outpoint(), self.outputs.len());
            self.outputs.push(record);
        }
    }

    /// Spend the inputs and create the outputs of one transaction.
    ///
    /// Nothing is mutated unless every input is valid.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        block_height: u64,
    ) -> Result<(), LedgerError> {
        self.check_transaction(tx, &mut HashSet::new(), &mut HashSet::new())?;
        self.apply_unchecked(tx, block_height);
        Ok(())
    }

    /// Apply a whole block's transactions in order, all or nothing
    pub fn apply_block(
        &mut self,
        transactions: &[Transaction],
        block_height: u64,
    ) -> Result<(), LedgerError> {
        let mut claimed = HashSet::new();
        let mut created = HashSet::new();
        for tx in transactions {
            self.check_transaction(tx, &mut claimed, &mut created)?;
        }
        for tx in transactions {
            self.apply_unchecked(tx, block_height);
        }
        Ok(())
    }
}
