//! Network analytics
//!
//! One data point is collected per committed block and kept in a bounded
//! ring. Chain-wide statistics are derived on demand from state; nothing
//! here is cached.

use crate::core::amount::Amount;
use crate::core::state::LedgerState;
use crate::core::Block;
use crate::mining::pow::{current_difficulty_with, target_for, RetargetParams};
use crate::mining::Mempool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of data points retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Blocks averaged for the network hash rate
const HASH_RATE_WINDOW: usize = 10;

fn default_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

/// Network snapshot taken right after a block is committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDataPoint {
    pub timestamp: DateTime<Utc>,
    pub block_height: u64,
    pub difficulty: f64,
    pub hash_rate: f64,
    pub block_time_seconds: f64,
    pub mempool_size: usize,
    pub total_transactions: u64,
    /// Mean fee of all regular transactions in the chain, in BTC
    pub average_fee: f64,
}

impl NetworkDataPoint {
    /// Build the data point for the chain's tip. Returns `None` on an
    /// empty chain.
    pub fn collect(chain: &[Block], mempool: &Mempool) -> Option<Self> {
        let tip = chain.last()?;

        let block_time_seconds = match chain.len().checked_sub(2).map(|i| &chain[i]) {
            Some(previous) => {
                (tip.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0
            }
            None => tip.mining_duration_ms.unwrap_or(0) as f64 / 1000.0,
        };

        Some(Self {
            timestamp: tip.timestamp,
            block_height: tip.height,
            difficulty: tip.difficulty,
            hash_rate: tip.hash_rate.unwrap_or(0.0),
            block_time_seconds,
            mempool_size: mempool.len(),
            total_transactions: total_transactions(chain),
            average_fee: average_fee(chain).map(Amount::as_btc_f64).unwrap_or(0.0),
        })
    }
}

/// Ring of the most recent data points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkHistory {
    points: VecDeque<NetworkDataPoint>,
    #[serde(skip, default = "default_capacity")]
    capacity: usize,
}

impl Default for NetworkHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl NetworkHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Change the capacity, dropping the oldest points if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.trim();
    }

    pub fn push(&mut self, point: NetworkDataPoint) {
        self.points.push_back(point);
        self.trim();
    }

    fn trim(&mut self) {
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Oldest first
    pub fn points(&self) -> impl Iterator<Item = &NetworkDataPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&NetworkDataPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// All transactions in the chain, coinbases included
pub fn total_transactions(chain: &[Block]) -> u64 {
    chain.iter().map(|b| b.tx_count() as u64).sum()
}

/// Mean fee over every regular transaction in the chain
pub fn average_fee(chain: &[Block]) -> Option<Amount> {
    let (count, total) = chain
        .iter()
        .flat_map(|b| b.regular_transactions())
        .fold((0u64, 0u64), |(n, sum), tx| (n + 1, sum + tx.fee.sats()));
    (count > 0).then(|| Amount::from_sats(total / count))
}

/// Mean interval between consecutive blocks in seconds
pub fn average_block_time(chain: &[Block]) -> Option<f64> {
    let first = chain.first()?;
    let last = chain.last()?;
    if chain.len() < 2 {
        return None;
    }
    let span = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
    Some(span / (chain.len() - 1) as f64)
}

/// Mean recorded hash rate of the most recent blocks
pub fn network_hash_rate(chain: &[Block]) -> f64 {
    let rates: Vec<f64> = chain
        .iter()
        .rev()
        .take(HASH_RATE_WINDOW)
        .filter_map(|b| b.hash_rate)
        .collect();
    if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}

/// Pending pool summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MempoolStats {
    pub count: usize,
    pub total_value: Amount,
    pub total_fees: Amount,
    pub oldest: Option<DateTime<Utc>>,
}

impl MempoolStats {
    pub fn derive(mempool: &Mempool) -> Self {
        Self {
            count: mempool.len(),
            total_value: mempool.iter().map(|tx| tx.total_output()).sum(),
            total_fees: mempool.total_fees(),
            oldest: mempool.iter().next().map(|tx| tx.timestamp),
        }
    }
}

/// Chain statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStats {
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub total_supply: Amount,
    pub average_block_time_seconds: Option<f64>,
    pub network_hash_rate: f64,
    pub average_fee: Option<Amount>,
    pub seconds_since_last_block: Option<i64>,
    pub active_validators: usize,
    pub next_difficulty: f64,
    pub next_target: String,
    pub mempool: MempoolStats,
}

impl ChainStats {
    pub fn derive(state: &LedgerState, params: &RetargetParams, now: DateTime<Utc>) -> Self {
        let chain = state.chain();
        let next_difficulty = current_difficulty_with(chain, params);

        Self {
            total_blocks: chain.len() as u64,
            total_transactions: total_transactions(chain),
            total_supply: state.ledger().total_unspent(),
            average_block_time_seconds: average_block_time(chain),
            network_hash_rate: network_hash_rate(chain),
            average_fee: average_fee(chain),
            seconds_since_last_block: chain.last().map(|b| (now - b.timestamp).num_seconds()),
            active_validators: state.validators().iter().filter(|v| v.is_active()).count(),
            next_difficulty,
            next_target: target_for(next_difficulty),
            mempool: MempoolStats::derive(state.mempool()),
        }
    }
}
