//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Amounts in integer satoshis
//! - Transactions (UTXO model, coinbase drafts)
//! - The UTXO ledger
//! - Blocks and block templates
//! - Validators
//! - The ledger state container and the chain manager operating on it

pub mod amount;
pub mod block;
pub mod chain;
pub mod state;
pub mod transaction;
pub mod utxo;
pub mod validator;

pub use amount::{Amount, AmountError, SATS_PER_BTC};
pub use block::{Block, BlockTemplate, GENESIS_PREVIOUS_HASH};
pub use chain::ChainError;
pub use state::{ChainPhase, LedgerState, StateSnapshot, FIRST_TX_ID};
pub use transaction::{
    build_coinbase, build_transfer, CoinbaseDraft, Transaction, TransactionBuilder,
    TransactionError, TransactionInput, TransactionOutput, TxKind,
};
pub use utxo::{InputSelection, LedgerError, OutPoint, UnspentOutput, UtxoLedger};
pub use validator::{choose_miner, default_validators, Validator, ValidatorStatus};
