//! Simulated validators
//!
//! Validators are labels, not processes. One is picked at random to win
//! each block and receives the coinbase.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidatorStatus {
    Active,
    Inactive,
}

/// A simulated mining node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Validator {
    pub id: u32,
    pub name: String,
    pub status: ValidatorStatus,
    pub blocks_won: u64,
    /// Advertised hash rate (H/s), display only
    pub simulated_hash_rate: f64,
    /// Address credited by this validator's coinbase transactions
    pub address: String,
}

impl Validator {
    pub fn new(id: u32, name: &str, address: &str, simulated_hash_rate: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            status: ValidatorStatus::Active,
            blocks_won: 0,
            simulated_hash_rate,
            address: address.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ValidatorStatus::Active
    }
}

/// The three validators every fresh network starts with
pub fn default_validators() -> Vec<Validator> {
    vec![
        Validator::new(1, "Node Alpha", "1NodeA1phaRewardsXXXXXXXXXXXXXXXXX", 1.2e12),
        Validator::new(2, "Node Beta", "1NodeBetaRewardsXXXXXXXXXXXXXXXXXX", 0.9e12),
        Validator::new(3, "Node Gamma", "1NodeGammaRewardsXXXXXXXXXXXXXXXXX", 1.5e12),
    ]
}

/// Pick an active validator uniformly at random
pub fn choose_miner<'a, R: Rng + ?Sized>(
    validators: &'a [Validator],
    rng: &mut R,
) -> Option<&'a Validator> {
    let active: Vec<&Validator> = validators.iter().filter(|v| v.is_active()).collect();
    active.choose(rng).copied()
}
