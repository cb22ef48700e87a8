//! Fingerprints for transactions, blocks and proof-of-work candidates
//!
//! A fingerprint is an opaque 64-character lowercase hex string. The
//! ledger only relies on it for chaining and for the proof-of-work
//! comparison, never for security, so the algorithm is pluggable.
//!
//! The simulated fingerprint appends a random suffix on every call and is
//! therefore not reproducible for identical input. Use [`Sha256Fingerprint`]
//! wherever reproducibility matters.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Length of every fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Produces an opaque fingerprint for a byte string
pub trait Fingerprint: Send + Sync + fmt::Debug {
    /// Fingerprint `data` as 64 lowercase hex characters
    fn digest(&self, data: &[u8]) -> String;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Selects a fingerprint implementation from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintKind {
    #[default]
    Simulated,
    Sha256,
}

impl FingerprintKind {
    pub fn build(self) -> Arc<dyn Fingerprint> {
        match self {
            FingerprintKind::Simulated => Arc::new(SimulatedFingerprint),
            FingerprintKind::Sha256 => Arc::new(Sha256Fingerprint),
        }
    }
}

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Deterministic SHA-256 fingerprint
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprint;

impl Fingerprint for Sha256Fingerprint {
    fn digest(&self, data: &[u8]) -> String {
        hex::encode(sha256(data))
    }

    fn name(&self) -> &'static str {
        "sha256"
    }
}

/// Placeholder fingerprint used by the simulator.
///
/// Layout: six zero digits, eight digits of the scrambled 32-bit fold of
/// the input, eight random digits, zero padding to 64 characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedFingerprint;

impl SimulatedFingerprint {
    /// Folds bytes into 32 bits with `h = h * 31 + b`
    pub fn fold(data: &[u8]) -> u32 {
        data.iter()
            .fold(0u32, |h, &b| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(b as u32))
    }

    /// 32-bit avalanche finalizer so neighbouring inputs land far apart
    fn scramble(mut h: u32) -> u32 {
        h ^= h >> 16;
        h = h.wrapping_mul(0x85eb_ca6b);
        h ^= h >> 13;
        h = h.wrapping_mul(0xc2b2_ae35);
        h ^= h >> 16;
        h
    }
}

impl Fingerprint for SimulatedFingerprint {
    fn digest(&self, data: &[u8]) -> String {
        let body = Self::scramble(Self::fold(data));
        let noise: u32 = rand::thread_rng().gen();
        let mut out = format!("000000{:08x}{:08x}", body, noise);
        out.push_str(&"0".repeat(FINGERPRINT_LEN - out.len()));
        out
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_fingerprint() {
        let fp = Sha256Fingerprint;
        assert_eq!(
            fp.digest(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(fp.digest(b"abc"), fp.digest(b"abc"));
    }

    #[test]
    fn test_simulated_shape() {
        let hash = SimulatedFingerprint.digest(b"block-1");
        assert_eq!(hash.len(), FINGERPRINT_LEN);
        assert!(hash.starts_with("000000"));
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_simulated_body_tracks_content() {
        let a = SimulatedFingerprint.digest(b"block-1");
        let b = SimulatedFingerprint.digest(b"block-1");
        let c = SimulatedFingerprint.digest(b"block-2");
        // content digits agree, the random suffix does not have to
        assert_eq!(&a[6..14], &b[6..14]);
        assert_ne!(&a[6..14], &c[6..14]);
    }

    #[test]
    fn test_fold_matches_shift_subtract() {
        assert_eq!(SimulatedFingerprint::fold(b""), 0);
        assert_eq!(SimulatedFingerprint::fold(b"a"), 97);
        assert_eq!(SimulatedFingerprint::fold(b"ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_kind_builds_matching_impl() {
        assert_eq!(FingerprintKind::Sha256.build().name(), "sha256");
        assert_eq!(FingerprintKind::default().build().name(), "simulated");
    }
}
