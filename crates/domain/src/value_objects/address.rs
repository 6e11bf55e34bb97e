use crate::errors::ExchangeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A contract or account address, normalized to lowercase hex.
///
/// Normalization at construction makes equality and ordering case
/// insensitive, and makes `Ord` the canonical pair ordering (ascending
/// address).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parses and normalizes an address string.
    ///
    /// # Errors
    /// Returns `ExchangeError::Validation` unless the input is `0x`
    /// followed by 40 hex digits.
    pub fn parse(s: &str) -> Result<Self, ExchangeError> {
        let normalized = s.trim().to_ascii_lowercase();
        let hex = normalized
            .strip_prefix("0x")
            .ok_or_else(|| ExchangeError::validation(format!("address missing 0x prefix: {s}")))?;
        if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ExchangeError::validation(format!("malformed address: {s}")));
        }
        Ok(Self(normalized))
    }

    /// Builds an address from a small integer. Used by in-process ledgers
    /// to mint fresh contract addresses.
    #[must_use]
    pub fn from_low_u64(n: u64) -> Self {
        Self(format!("0x{n:040x}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Orders a token pair canonically (ascending address), yielding one pool
/// identity per unordered pair.
#[must_use]
pub fn canonical_pair(a: Address, b: Address) -> (Address, Address) {
    if a <= b { (a, b) } else { (b, a) }
}
