//! Simulator persistence layer
//!
//! Every part of the network state is stored under its own key, one JSON
//! file per key. Missing keys load as their genesis value.

use crate::core::state::StateSnapshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error in {key}: {source}")]
    SerializationError {
        key: StorageKey,
        source: serde_json::Error,
    },
}

/// Independently stored parts of the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    Blockchain,
    Mempool,
    Wallets,
    Utxos,
    Validators,
    TxCounter,
    NetworkHistory,
}

impl StorageKey {
    pub const ALL: [StorageKey; 7] = [
        StorageKey::Blockchain,
        StorageKey::Mempool,
        StorageKey::Wallets,
        StorageKey::Utxos,
        StorageKey::Validators,
        StorageKey::TxCounter,
        StorageKey::NetworkHistory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Blockchain => "bitcoin-blockchain",
            StorageKey::Mempool => "bitcoin-mempool",
            StorageKey::Wallets => "bitcoin-wallets",
            StorageKey::Utxos => "bitcoin-utxos",
            StorageKey::Validators => "bitcoin-validators",
            StorageKey::TxCounter => "bitcoin-txcounter",
            StorageKey::NetworkHistory => "bitcoin-network-history",
        }
    }

    fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Snapshot storage manager
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    fn path(&self, key: StorageKey) -> PathBuf {
        self.config.data_dir.join(key.file_name())
    }

    /// Write one key through a temporary file and an atomic rename
    fn write_key<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<(), StorageError> {
        let path = self.path(key);
        let temp_path = self.config.data_dir.join(format!("{}.tmp", key.as_str()));

        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|source| StorageError::SerializationError { key, source })?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    /// Read one key, `None` when it was never written
    fn read_key<T: DeserializeOwned>(&self, key: StorageKey) -> Result<Option<T>, StorageError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(&path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map(Some)
            .map_err(|source| StorageError::SerializationError { key, source })
    }

    /// Save every key of the snapshot
    pub fn save(&self, snapshot: &StateSnapshot) -> Result<(), StorageError> {
        self.write_key(StorageKey::Blockchain, &snapshot.chain)?;
        self.write_key(StorageKey::Mempool, &snapshot.mempool)?;
        self.write_key(StorageKey::Wallets, &snapshot.wallets)?;
        self.write_key(StorageKey::Utxos, &snapshot.utxos)?;
        self.write_key(StorageKey::Validators, &snapshot.validators)?;
        self.write_key(StorageKey::TxCounter, &snapshot.tx_counter)?;
        self.write_key(StorageKey::NetworkHistory, &snapshot.network_history)?;
        Ok(())
    }

    /// Load a snapshot; keys that are missing take their genesis value
    pub fn load(&self) -> Result<StateSnapshot, StorageError> {
        let genesis = StateSnapshot::genesis();
        Ok(StateSnapshot {
            chain: self.read_key(StorageKey::Blockchain)?.unwrap_or(genesis.chain),
            mempool: self.read_key(StorageKey::Mempool)?.unwrap_or(genesis.mempool),
            wallets: self.read_key(StorageKey::Wallets)?.unwrap_or(genesis.wallets),
            utxos: self.read_key(StorageKey::Utxos)?.unwrap_or(genesis.utxos),
            validators: self
                .read_key(StorageKey::Validators)?
                .unwrap_or(genesis.validators),
            tx_counter: self
                .read_key(StorageKey::TxCounter)?
                .unwrap_or(genesis.tx_counter),
            network_history: self
                .read_key(StorageKey::NetworkHistory)?
                .unwrap_or(genesis.network_history),
        })
    }

    /// Check if any key has been saved
    pub fn exists(&self) -> bool {
        StorageKey::ALL.iter().any(|key| self.path(*key).exists())
    }

    /// Delete every saved key
    pub fn clear(&self) -> Result<(), StorageError> {
        for key in StorageKey::ALL {
            let path = self.path(key);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats {
            total_size: 0,
            keys_present: 0,
            data_dir: self.config.data_dir.clone(),
        };

        for key in StorageKey::ALL {
            let path = self.path(key);
            if path.exists() {
                stats.total_size += fs::metadata(&path)?.len();
                stats.keys_present += 1;
            }
        }

        Ok(stats)
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub total_size: u64,
    pub keys_present: usize,
    pub data_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::amount::Amount;
    use crate::core::state::LedgerState;
    use crate::crypto::Sha256Fingerprint;
    use crate::wallet::WalletId;

    fn storage(dir: &tempfile::TempDir) -> Storage {
        Storage::new(StorageConfig {
            data_dir: dir.path().to_path_buf(),
        })
        .unwrap()
    }

    #[test]
    fn test_save_load_snapshot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir);

        let mut state = LedgerState::genesis(50);
        state
            .submit_wallet_transfer(
                WalletId::Wallet1,
                WalletId::Wallet3,
                Amount::from_btc(5),
                Amount::from_cents(1),
                &Sha256Fingerprint,
            )
            .unwrap();

        storage.save(&state.to_snapshot()).unwrap();
        assert!(storage.exists());
        assert_eq!(storage.stats().unwrap().keys_present, 7);

        let loaded = LedgerState::from_snapshot(storage.load().unwrap(), 50).unwrap();
        assert_eq!(loaded.mempool().len(), 1);
        assert_eq!(loaded.tx_counter(), 2);
        assert_eq!(
            loaded.balance_of(WalletId::Wallet3).unwrap(),
            Amount::from_btc(25)
        );
        assert_eq!(loaded.ledger().outputs().len(), 3);
    }

    #[test]
    fn test_missing_keys_load_as_genesis() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir);
        assert!(!storage.exists());

        storage.write_key(StorageKey::TxCounter, &9u64).unwrap();
        let snapshot = storage.load().unwrap();
        assert_eq!(snapshot.tx_counter, 9);
        assert!(snapshot.chain.is_empty());
        assert_eq!(snapshot.utxos.outputs().len(), 3);
    }

    #[test]
    fn test_corrupt_key_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir);
        fs::write(temp_dir.path().join("bitcoin-mempool.json"), "not json").unwrap();

        match storage.load() {
            Err(StorageError::SerializationError { key, .. }) => {
                assert_eq!(key, StorageKey::Mempool)
            }
            other => panic!("expected serialization error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_write_installs_complete_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir);
        let snapshot = StateSnapshot::genesis();
        storage.write_key(StorageKey::Utxos, &snapshot.utxos).unwrap();

        assert!(!temp_dir.path().join("bitcoin-utxos.tmp").exists());
        let raw = fs::read_to_string(temp_dir.path().join("bitcoin-utxos.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_clear_removes_all_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir);
        storage.save(&StateSnapshot::genesis()).unwrap();
        assert!(storage.exists());

        storage.clear().unwrap();
        assert!(!storage.exists());
        assert_eq!(storage.stats().unwrap().total_size, 0);
        assert!(!temp_dir.path().join("bitcoin-utxos.tmp").exists());
    }
}
