//! Mining module for block creation and transaction pooling

pub mod auto;
pub mod mempool;
pub mod miner;
pub mod pow;

pub use auto::{synthetic_transfers, AutoMiner, SyntheticTransfer};
pub use mempool::{Mempool, MempoolError};
pub use miner::{Miner, MinerError, MiningProgress, SharedState};
pub use pow::{
    current_difficulty, current_difficulty_with, estimate_hash_rate, format_hash_rate,
    meets_target, search, target_for, MiningError, MiningResult, ProofSearch, RetargetParams,
};
