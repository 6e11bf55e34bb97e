use crate::errors::ExchangeError;
use crate::value_objects::address::Address;
use crate::value_objects::amount::TokenAmount;
use serde::{Deserialize, Serialize};

/// One user's cumulative liquidity position in one pool, keyed by
/// (user, pool). Created on first contribution, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPosition {
    pub user: Address,
    pub pool: Address,
    /// LP share balance. Must never go negative.
    pub balance: TokenAmount,
    pub token0_amount: TokenAmount,
    pub token1_amount: TokenAmount,
    pub created_at: u64,
    pub updated_at: u64,
}

impl LiquidityPosition {
    pub fn new(user: Address, pool: Address, created_at: u64) -> Self {
        Self {
            user,
            pool,
            balance: TokenAmount::zero(),
            token0_amount: TokenAmount::zero(),
            token1_amount: TokenAmount::zero(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Subgraph-style composite id, `user-pool`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}-{}", self.user, self.pool)
    }

    pub fn apply_add(
        &mut self,
        amount0: TokenAmount,
        amount1: TokenAmount,
        minted: TokenAmount,
        timestamp: u64,
    ) -> Result<(), ExchangeError> {
        self.balance = self.checked(self.balance.checked_add(minted))?;
        self.token0_amount = self.checked(self.token0_amount.checked_add(amount0))?;
        self.token1_amount = self.checked(self.token1_amount.checked_add(amount1))?;
        self.updated_at = timestamp;
        Ok(())
    }

    pub fn apply_remove(
        &mut self,
        amount0: TokenAmount,
        amount1: TokenAmount,
        burned: TokenAmount,
        timestamp: u64,
    ) -> Result<(), ExchangeError> {
        self.balance = self.checked(self.balance.checked_sub(burned))?;
        self.token0_amount = self.checked(self.token0_amount.checked_sub(amount0))?;
        self.token1_amount = self.checked(self.token1_amount.checked_sub(amount1))?;
        self.updated_at = timestamp;
        Ok(())
    }

    fn checked(&self, value: Option<TokenAmount>) -> Result<TokenAmount, ExchangeError> {
        value.ok_or_else(|| {
            ExchangeError::consistency(
                self.pool.clone(),
                format!("position {} balance update out of range", self.id()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_accumulates_and_never_goes_negative() {
        let mut lp = LiquidityPosition::new(
            Address::from_low_u64(1),
            Address::from_low_u64(2),
            1_700_000_000,
        );
        lp.apply_add(
            TokenAmount::from(10u64),
            TokenAmount::from(20u64),
            TokenAmount::from(14u64),
            1_700_000_001,
        )
        .unwrap();
        assert_eq!(lp.balance, TokenAmount::from(14u64));

        let err = lp
            .apply_remove(
                TokenAmount::zero(),
                TokenAmount::zero(),
                TokenAmount::from(15u64),
                1_700_000_002,
            )
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Consistency { .. }));
    }
}
