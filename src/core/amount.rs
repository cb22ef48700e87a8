//! Monetary amounts
//!
//! Every value in the ledger is an integer number of satoshis so that
//! conservation checks are exact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use thiserror::Error;

/// Satoshis per whole coin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Errors produced when parsing amount text
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,
    #[error("Invalid amount: {0}")]
    Invalid(String),
    #[error("Amount must be positive: {0}")]
    NotPositive(String),
    #[error("Amount too large: {0}")]
    Overflow(String),
}

/// An amount of coins, stored in satoshis
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from satoshis
    pub const fn from_sats(sats: u64) -> Self {
        Self(sats)
    }

    /// Create an amount from whole coins
    pub const fn from_btc(btc: u64) -> Self {
        Self(btc * SATS_PER_BTC)
    }

    /// Create an amount from hundredths of a coin (e.g. `from_cents(625)` is 6.25)
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents * (SATS_PER_BTC / 100))
    }

    /// Raw satoshi value
    pub const fn sats(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Value in coins, for statistics and display only
    pub fn as_btc_f64(self) -> f64 {
        self.0 as f64 / SATS_PER_BTC as f64
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Parse decimal coin text such as `"30"`, `"69.99"` or `"0.01"`.
    ///
    /// Anything that is not a strictly positive, finite number of coins
    /// representable in satoshis is rejected.
    pub fn parse_btc(text: &str) -> Result<Self, AmountError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        let value: f64 = trimmed
            .parse()
            .map_err(|_| AmountError::Invalid(trimmed.to_string()))?;

        if !value.is_finite() {
            return Err(AmountError::Invalid(trimmed.to_string()));
        }
        if value <= 0.0 {
            return Err(AmountError::NotPositive(trimmed.to_string()));
        }

        let sats = (value * SATS_PER_BTC as f64).round();
        if sats >= u64::MAX as f64 {
            return Err(AmountError::Overflow(trimmed.to_string()));
        }
        if sats < 1.0 {
            return Err(AmountError::NotPositive(trimmed.to_string()));
        }

        Ok(Self(sats as u64))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Amount {
        iter.copied().sum()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:08} BTC",
            self.0 / SATS_PER_BTC,
            self.0 % SATS_PER_BTC
        )
    }
}
