//! Fingerprinting for the simulator
//!
//! This module provides:
//! - The pluggable `Fingerprint` trait
//! - The simulated reference fingerprint
//! - SHA-256 hashing

pub mod fingerprint;

pub use fingerprint::{
    sha256, Fingerprint, FingerprintKind, Sha256Fingerprint, SimulatedFingerprint,
    FINGERPRINT_LEN,
};
