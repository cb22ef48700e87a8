//! Storage module for simulator persistence

pub mod persistence;

pub use persistence::{Storage, StorageConfig, StorageError, StorageKey, StorageStats};
