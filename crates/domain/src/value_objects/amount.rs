use crate::errors::ExchangeError;
use primitive_types::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A raw token amount in base units (the ledger's unsigned integers).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub fn new(amount: impl Into<U256>) -> Self {
        Self(amount.into())
    }

    #[must_use]
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl From<u64> for TokenAmount {
    fn from(v: u64) -> Self {
        Self(U256::from(v))
    }
}

impl From<u128> for TokenAmount {
    fn from(v: u128) -> Self {
        Self(U256::from(v))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A base-unit amount paired with its token's decimal precision.
///
/// Bridges human-readable request amounts and the raw integers the ledger
/// expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub raw: TokenAmount,
    pub decimals: u8,
}

impl Amount {
    pub fn new(raw: TokenAmount, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Converts a human-readable decimal to base units.
    ///
    /// # Errors
    /// Returns `ExchangeError::Validation` for negative values, excess
    /// fractional digits, or amounts that overflow the conversion.
    pub fn from_decimal(value: Decimal, decimals: u8) -> Result<Self, ExchangeError> {
        if value.is_sign_negative() {
            return Err(ExchangeError::validation(format!(
                "amount must not be negative: {value}"
            )));
        }
        if decimals > 28 {
            return Err(ExchangeError::validation(format!(
                "unsupported decimal precision: {decimals}"
            )));
        }
        let multiplier = Decimal::from_i128_with_scale(10i128.pow(u32::from(decimals)), 0);
        let scaled = value.checked_mul(multiplier).ok_or_else(|| {
            ExchangeError::validation(format!("amount out of range: {value}"))
        })?;
        if scaled.fract() != Decimal::ZERO {
            return Err(ExchangeError::validation(format!(
                "amount {value} has more than {decimals} fractional digits"
            )));
        }
        let raw = scaled
            .to_u128()
            .ok_or_else(|| ExchangeError::validation(format!("amount out of range: {value}")))?;
        Ok(Self {
            raw: TokenAmount::from(raw),
            decimals,
        })
    }

    /// Converts back to a human-readable decimal. Display only; amounts
    /// beyond `Decimal` range saturate to zero.
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        let raw = Decimal::from_str(&self.raw.0.to_string()).unwrap_or_default();
        let divisor = Decimal::from_i128_with_scale(10i128.pow(u32::from(self.decimals)), 0);
        raw / divisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_decimal_scales_by_token_precision() {
        let amount = Amount::from_decimal(dec!(1.5), 18).unwrap();
        assert_eq!(amount.raw, TokenAmount::from(1_500_000_000_000_000_000u128));

        let amount = Amount::from_decimal(dec!(2), 6).unwrap();
        assert_eq!(amount.raw, TokenAmount::from(2_000_000u64));
    }

    #[test]
    fn test_from_decimal_rejects_negative_and_excess_precision() {
        assert!(Amount::from_decimal(dec!(-1), 18).is_err());
        assert!(Amount::from_decimal(dec!(0.0000001), 6).is_err());
    }

    #[test]
    fn test_to_decimal_round_trips() {
        let amount = Amount::from_decimal(dec!(12.25), 8).unwrap();
        assert_eq!(amount.to_decimal(), dec!(12.25));
    }

    #[test]
    fn test_checked_sub_detects_underflow() {
        let a = TokenAmount::from(5u64);
        let b = TokenAmount::from(7u64);
        assert!(a.checked_sub(b).is_none());
        assert_eq!(b.checked_sub(a), Some(TokenAmount::from(2u64)));
    }
}
