//! Wallet identities
//!
//! A wallet is an address plus a placeholder key. Balances are never
//! stored here; they are always derived from the UTXO ledger.

use crate::core::amount::Amount;
use crate::core::utxo::{UnspentOutput, UtxoLedger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Unknown wallet: {0}")]
    UnknownWallet(String),
}

/// Identifier of one of the simulator's wallets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletId {
    Wallet1,
    Wallet2,
    Wallet3,
}

impl WalletId {
    pub const ALL: [WalletId; 3] = [WalletId::Wallet1, WalletId::Wallet2, WalletId::Wallet3];

    pub fn as_str(self) -> &'static str {
        match self {
            WalletId::Wallet1 => "wallet1",
            WalletId::Wallet2 => "wallet2",
            WalletId::Wallet3 => "wallet3",
        }
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletId {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WalletId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WalletError::UnknownWallet(s.to_string()))
    }
}

/// A wallet identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub address: String,
    pub private_key_placeholder: String,
}

impl Wallet {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            private_key_placeholder: format!("priv:{}", address),
        }
    }

    /// Get the balance from the ledger
    pub fn balance(&self, ledger: &UtxoLedger) -> Amount {
        ledger.balance_of(&self.address)
    }

    /// Get unspent outputs owned by this wallet
    pub fn utxos(&self, ledger: &UtxoLedger) -> Vec<UnspentOutput> {
        ledger.unspent_outputs_for(&self.address)
    }
}

/// The wallets of a network, keyed by id
pub type Wallets = BTreeMap<WalletId, Wallet>;

/// Wallets and their genesis allocation
pub fn default_wallets() -> Wallets {
    [
        (WalletId::Wallet1, Wallet::new("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")),
        (WalletId::Wallet2, Wallet::new("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2")),
        (WalletId::Wallet3, Wallet::new("1Lbcfr7sAHTD9CgdQo3HTMTkV8LK4ZnX71")),
    ]
    .into_iter()
    .collect()
}

/// Genesis outputs: 100, 50 and 25 BTC to the three default wallets
pub fn genesis_outputs(wallets: &Wallets) -> Vec<UnspentOutput> {
    let allocation = [
        (WalletId::Wallet1, Amount::from_btc(100)),
        (WalletId::Wallet2, Amount::from_btc(50)),
        (WalletId::Wallet3, Amount::from_btc(25)),
    ];

    allocation
        .iter()
        .enumerate()
        .filter_map(|(index, (id, amount))| {
            wallets.get(id).map(|wallet| UnspentOutput {
                transaction_id: 0,
                output_index: index as u32,
                address: wallet.address.clone(),
                amount: *amount,
                spent: false,
                spending_transaction_id: None,
                block_height: Some(0),
            })
        })
        .collect()
}
