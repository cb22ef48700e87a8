//! Bitcoin-sim: a UTXO ledger and proof-of-work mining simulator
//!
//! This crate provides a small simulated Bitcoin network featuring:
//! - UTXO transaction model with exact satoshi arithmetic
//! - All-or-nothing block commits that never double-spend
//! - Continuous difficulty retargeting
//! - A resumable, cancellable proof-of-work search
//! - Validators picked at random to mine each block
//! - Automatic mining with synthetic transfers
//! - Network analytics and per-key JSON persistence
//!
//! # Example
//!
//! ```rust
//! use bitcoin_sim::config::SimulatorConfig;
//! use bitcoin_sim::core::{Amount, LedgerState};
//! use bitcoin_sim::crypto::SimulatedFingerprint;
//! use bitcoin_sim::mining::ProofSearch;
//! use bitcoin_sim::wallet::WalletId;
//!
//! let config = SimulatorConfig::default();
//! let fp = SimulatedFingerprint;
//! let mut state = LedgerState::genesis(config.history_capacity);
//!
//! // Queue a transfer
//! state
//!     .submit_wallet_transfer(
//!         WalletId::Wallet1,
//!         WalletId::Wallet2,
//!         Amount::from_btc(30),
//!         config.transfer_fee,
//!         &fp,
//!     )
//!     .unwrap();
//!
//! // Mine it
//! let template = state
//!     .assemble_template(&config, &fp, &mut rand::thread_rng())
//!     .unwrap();
//! let proof = ProofSearch::new(template.header_bytes(), template.difficulty, config.max_attempts)
//!     .run_batch(&fp, config.max_attempts)
//!     .unwrap();
//! let block = state.commit_block(&template, &proof, 10).unwrap();
//! println!("Mined block {} with nonce {}", block.height, block.nonce);
//!
//! // Check balance
//! let balance = state.balance_of(WalletId::Wallet1).unwrap();
//! assert_eq!(balance, Amount::parse_btc("69.99").unwrap());
//! ```

pub mod analytics;
pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod simulator;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use analytics::{ChainStats, MempoolStats, NetworkDataPoint, NetworkHistory};
pub use config::SimulatorConfig;
pub use core::{Amount, Block, ChainError, LedgerState, Transaction, UtxoLedger};
pub use crypto::{Fingerprint, FingerprintKind};
pub use mining::{AutoMiner, Mempool, Miner, MiningError};
pub use simulator::{Simulator, SimulatorError};
pub use storage::Storage;
pub use wallet::{Wallet, WalletId};
