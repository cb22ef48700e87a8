//! Wallet module for simulator identities

pub mod wallet;

pub use wallet::{default_wallets, genesis_outputs, Wallet, WalletError, WalletId, Wallets};
