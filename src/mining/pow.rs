//! Proof of work
//!
//! Difficulty is a continuous value; its integer part is the number of
//! leading zero hex digits a proof hash must have. The search is a
//! resumable unit of work so callers can report progress and cancel
//! between batches.

use crate::config::SimulatorConfig;
use crate::core::Block;
use crate::crypto::{Fingerprint, FINGERPRINT_LEN};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Mining errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MiningError {
    #[error("Mining attempt exhausted after {attempts} attempts")]
    Exhausted { attempts: u64 },
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
    #[error("Mining task failed: {0}")]
    TaskFailed(String),
}

/// Outcome of a proof search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningResult {
    pub nonce: u64,
    pub hash: String,
    pub attempts: u64,
    pub success: bool,
}

/// Parameters of the difficulty controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetargetParams {
    pub starting: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub window: usize,
    pub target_block_time_ms: u64,
}

impl Default for RetargetParams {
    fn default() -> Self {
        Self::from(&SimulatorConfig::default())
    }
}

impl From<&SimulatorConfig> for RetargetParams {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            starting: config.starting_difficulty,
            min: config.min_difficulty,
            max: config.max_difficulty,
            step: config.difficulty_step,
            window: config.retarget_window,
            target_block_time_ms: config.target_block_time_ms,
        }
    }
}

/// Difficulty for the next block with the reference parameters
pub fn current_difficulty(chain: &[Block]) -> f64 {
    current_difficulty_with(chain, &RetargetParams::default())
}

/// Retarget from the mean interval of the most recent blocks.
///
/// Fewer than two blocks yields the starting difficulty. Otherwise the
/// tip's difficulty moves one step down when blocks are more than 1.5x
/// slower than the target, one step up when they are more than 2x faster.
pub fn current_difficulty_with(chain: &[Block], params: &RetargetParams) -> f64 {
    if chain.len() < 2 {
        return params.starting;
    }

    let window = params.window.clamp(2, chain.len());
    let recent = &chain[chain.len() - window..];
    let first = recent[0].timestamp.timestamp_millis();
    let last = recent[window - 1].timestamp.timestamp_millis();
    let avg_block_time = (last - first) as f64 / (window - 1) as f64;

    let ratio = avg_block_time / params.target_block_time_ms as f64;
    let base = recent[window - 1].difficulty;
    let base = if base.is_finite() {
        base.clamp(params.min, params.max)
    } else {
        params.starting
    };

    if ratio > 1.5 {
        (base - params.step).max(params.min)
    } else if ratio < 0.5 {
        (base + params.step).min(params.max)
    } else {
        base
    }
}

/// Comparison target: `floor(difficulty)` zero digits, then all `f`
pub fn target_for(difficulty: f64) -> String {
    let zeros = if difficulty.is_finite() && difficulty > 0.0 {
        (difficulty.floor() as usize).min(FINGERPRINT_LEN)
    } else {
        0
    };
    let mut target = "0".repeat(zeros);
    target.push_str(&"f".repeat(FINGERPRINT_LEN - zeros));
    target
}

/// Check if hash meets the target (lexicographic, equal-length hex)
pub fn meets_target(hash: &str, target: &str) -> bool {
    hash <= target
}

/// Heuristic hash rate: `16^difficulty` expected attempts over the
/// elapsed time. Elapsed time is clamped to at least one millisecond.
pub fn estimate_hash_rate(difficulty: f64, elapsed_ms: u64) -> f64 {
    let expected_attempts = 2f64.powf(4.0 * difficulty);
    expected_attempts * 1000.0 / elapsed_ms.max(1) as f64
}

/// Format hash rate for display
pub fn format_hash_rate(hash_rate: f64) -> String {
    if hash_rate >= 1e12 {
        format!("{:.2} TH/s", hash_rate / 1e12)
    } else if hash_rate >= 1e9 {
        format!("{:.2} GH/s", hash_rate / 1e9)
    } else if hash_rate >= 1e6 {
        format!("{:.2} MH/s", hash_rate / 1e6)
    } else if hash_rate >= 1e3 {
        format!("{:.2} KH/s", hash_rate / 1e3)
    } else {
        format!("{:.0} H/s", hash_rate)
    }
}

/// A resumable nonce search over fixed template bytes
#[derive(Debug, Clone)]
pub struct ProofSearch {
    header: Vec<u8>,
    target: String,
    max_attempts: u64,
    next_nonce: u64,
    attempts: u64,
}

impl ProofSearch {
    pub fn new(header: Vec<u8>, difficulty: f64, max_attempts: u64) -> Self {
        Self {
            header,
            target: target_for(difficulty),
            max_attempts,
            next_nonce: 0,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    fn candidate(&self, nonce: u64) -> Vec<u8> {
        let mut data = self.header.clone();
        data.extend_from_slice(nonce.to_string().as_bytes());
        data
    }

    fn exhausted(&self, fingerprint: &dyn Fingerprint) -> MiningResult {
        MiningResult {
            nonce: 0,
            hash: fingerprint.digest(&self.candidate(0)),
            attempts: self.attempts,
            success: false,
        }
    }

    /// Try up to `batch` more nonces. Returns the result once the search
    /// has either found a proof or used up its attempt budget.
    pub fn run_batch(&mut self, fingerprint: &dyn Fingerprint, batch: u64) -> Option<MiningResult> {
        for _ in 0..batch {
            if self.attempts >= self.max_attempts {
                return Some(self.exhausted(fingerprint));
            }

            let nonce = self.next_nonce;
            let hash = fingerprint.digest(&self.candidate(nonce));
            self.attempts += 1;

            if meets_target(&hash, &self.target) {
                return Some(MiningResult {
                    nonce,
                    hash,
                    attempts: self.attempts,
                    success: true,
                });
            }

            self.next_nonce += 1;
        }

        if self.attempts >= self.max_attempts {
            return Some(self.exhausted(fingerprint));
        }
        None
    }
}

/// Search for a nonce, reporting cumulative attempts after every batch.
///
/// The cancel flag is checked between batches. Running out of attempts
/// is not an error: the result comes back with `success == false`.
pub fn search<F>(
    header: &[u8],
    difficulty: f64,
    max_attempts: u64,
    batch: u64,
    fingerprint: &dyn Fingerprint,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> Result<MiningResult, MiningError>
where
    F: FnMut(u64),
{
    let mut search = ProofSearch::new(header.to_vec(), difficulty, max_attempts);
    let batch = batch.max(1);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(MiningError::Cancelled {
                attempts: search.attempts(),
            });
        }

        if let Some(result) = search.run_batch(fingerprint, batch) {
            on_progress(result.attempts);
            return Ok(result);
        }

        on_progress(search.attempts());
    }
}
