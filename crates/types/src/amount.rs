//! Monetary amounts in minimum units.

use serde::{Deserialize, Serialize};

/// One whole coin expressed in minimum units.
pub const UNIT: Amount = Amount(10_000_000);

/// Flat fee every transaction must pay at minimum.
pub const BASE_FEE: Amount = Amount(10_000);

/// A non-negative balance or payment amount, in minimum units.
///
/// Arithmetic is checked; an overflowing ledger computation is a bug in the
/// caller and surfaces as an error rather than wrapping.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount overflow")]
    Overflow,
    #[error("amount underflow")]
    Underflow,
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub fn add(self, other: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    pub fn sub(self, other: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(AmountError::Underflow)
    }

    /// Whether this amount is an exact multiple of [`UNIT`].
    pub fn is_whole_unit(&self) -> bool {
        self.0 % UNIT.0 == 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::iter::Sum<Amount> for Result<Amount, AmountError> {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Ok(Amount::ZERO), |acc, x| acc?.add(x))
    }
}
