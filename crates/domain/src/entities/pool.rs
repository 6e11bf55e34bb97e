use crate::errors::ExchangeError;
use crate::value_objects::address::Address;
use crate::value_objects::amount::TokenAmount;
use serde::{Deserialize, Serialize};

/// All pools run the same fixed fee tier.
pub const POOL_FEE_BPS: u32 = 30;

/// Materialized view of one pool contract.
///
/// Reserves and total supply are running sums over the event history and
/// must never go negative; every mutation uses checked arithmetic and
/// surfaces underflow/overflow as `ExchangeError::Consistency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: TokenAmount,
    pub reserve1: TokenAmount,
    pub total_supply: TokenAmount,
    pub fee_bps: u32,
    pub created_at: u64,
    pub created_at_block: u64,
}

impl Pool {
    /// Creates a pool with zeroed reserves and supply, as emitted at
    /// creation time.
    pub fn new(
        address: Address,
        token0: Address,
        token1: Address,
        created_at: u64,
        created_at_block: u64,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            reserve0: TokenAmount::zero(),
            reserve1: TokenAmount::zero(),
            total_supply: TokenAmount::zero(),
            fee_bps: POOL_FEE_BPS,
            created_at,
            created_at_block,
        }
    }

    /// Whether `token` is one of the pool's two constituent tokens.
    /// Addresses are normalized, so this is case insensitive.
    #[must_use]
    pub fn contains_token(&self, token: &Address) -> bool {
        self.token0 == *token || self.token1 == *token
    }

    /// Applies a confirmed liquidity addition.
    pub fn apply_liquidity_added(
        &mut self,
        amount0: TokenAmount,
        amount1: TokenAmount,
        minted: TokenAmount,
    ) -> Result<(), ExchangeError> {
        self.reserve0 = self.checked("reserve0", self.reserve0.checked_add(amount0))?;
        self.reserve1 = self.checked("reserve1", self.reserve1.checked_add(amount1))?;
        self.total_supply = self.checked("totalSupply", self.total_supply.checked_add(minted))?;
        Ok(())
    }

    /// Applies a confirmed liquidity removal. A decrement that would take
    /// any of reserve0/reserve1/totalSupply negative is a consistency
    /// violation, never clamped.
    pub fn apply_liquidity_removed(
        &mut self,
        amount0: TokenAmount,
        amount1: TokenAmount,
        burned: TokenAmount,
    ) -> Result<(), ExchangeError> {
        self.reserve0 = self.checked("reserve0", self.reserve0.checked_sub(amount0))?;
        self.reserve1 = self.checked("reserve1", self.reserve1.checked_sub(amount1))?;
        self.total_supply = self.checked("totalSupply", self.total_supply.checked_sub(burned))?;
        Ok(())
    }

    /// Applies a confirmed swap: +amountIn on the tokenIn side, -amountOut
    /// on the other side.
    pub fn apply_swap(
        &mut self,
        token_in: &Address,
        amount_in: TokenAmount,
        amount_out: TokenAmount,
    ) -> Result<(), ExchangeError> {
        if !self.contains_token(token_in) {
            return Err(ExchangeError::validation(format!(
                "token {token_in} is not part of pool {}",
                self.address
            )));
        }
        if *token_in == self.token0 {
            self.reserve0 = self.checked("reserve0", self.reserve0.checked_add(amount_in))?;
            self.reserve1 = self.checked("reserve1", self.reserve1.checked_sub(amount_out))?;
        } else {
            self.reserve1 = self.checked("reserve1", self.reserve1.checked_add(amount_in))?;
            self.reserve0 = self.checked("reserve0", self.reserve0.checked_sub(amount_out))?;
        }
        Ok(())
    }

    fn checked(
        &self,
        field: &str,
        value: Option<TokenAmount>,
    ) -> Result<TokenAmount, ExchangeError> {
        value.ok_or_else(|| {
            ExchangeError::consistency(
                self.address.clone(),
                format!("{field} update out of range"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Pool {
        Pool::new(
            Address::from_low_u64(100),
            Address::from_low_u64(1),
            Address::from_low_u64(2),
            1_700_000_000,
            1,
        )
    }

    #[test]
    fn test_reserves_track_signed_deltas() {
        let mut p = pool();
        p.apply_liquidity_added(
            TokenAmount::from(100u64),
            TokenAmount::from(200u64),
            TokenAmount::from(141u64),
        )
        .unwrap();
        p.apply_liquidity_removed(
            TokenAmount::from(40u64),
            TokenAmount::from(80u64),
            TokenAmount::from(56u64),
        )
        .unwrap();

        assert_eq!(p.reserve0, TokenAmount::from(60u64));
        assert_eq!(p.reserve1, TokenAmount::from(120u64));
        assert_eq!(p.total_supply, TokenAmount::from(85u64));
    }

    #[test]
    fn test_removal_below_zero_is_consistency_error() {
        let mut p = pool();
        p.apply_liquidity_added(
            TokenAmount::from(10u64),
            TokenAmount::from(10u64),
            TokenAmount::from(10u64),
        )
        .unwrap();

        let err = p
            .apply_liquidity_removed(
                TokenAmount::from(11u64),
                TokenAmount::from(1u64),
                TokenAmount::from(1u64),
            )
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Consistency { .. }));
    }

    #[test]
    fn test_swap_updates_sides_by_token_in() {
        let mut p = pool();
        p.apply_liquidity_added(
            TokenAmount::from(1000u64),
            TokenAmount::from(1000u64),
            TokenAmount::from(1000u64),
        )
        .unwrap();

        // token1 in: reserve1 grows, reserve0 shrinks.
        let token1 = p.token1.clone();
        p.apply_swap(&token1, TokenAmount::from(10u64), TokenAmount::from(9u64))
            .unwrap();
        assert_eq!(p.reserve0, TokenAmount::from(991u64));
        assert_eq!(p.reserve1, TokenAmount::from(1010u64));
    }

    #[test]
    fn test_swap_with_foreign_token_is_validation_error() {
        let mut p = pool();
        let err = p
            .apply_swap(
                &Address::from_low_u64(99),
                TokenAmount::from(1u64),
                TokenAmount::zero(),
            )
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }
}
