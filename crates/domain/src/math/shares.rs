use crate::errors::ExchangeError;
use crate::value_objects::amount::TokenAmount;
use primitive_types::U256;

const BPS: u32 = 10_000;

/// Swap fee for reporting: `floor(amount_in * fee_bps / 10000)`.
///
/// The authoritative fee deduction happens inside the pool contract;
/// rounding differences here must never block indexing, so the
/// multiplication saturates instead of erroring.
#[must_use]
pub fn swap_fee(amount_in: TokenAmount, fee_bps: u32) -> TokenAmount {
    let fee = amount_in.0.saturating_mul(U256::from(fee_bps)) / U256::from(BPS);
    TokenAmount(fee)
}

/// Shares required to withdraw the given token amounts from a pool:
/// `min(amount0 * total_supply / reserve0, amount1 * total_supply / reserve1)`
/// with truncating division, so a withdrawal can never exceed the target
/// amounts.
///
/// # Errors
/// `ExchangeError::Validation` when the pool has no liquidity or the
/// intermediate product overflows.
pub fn shares_for_amounts(
    amount0: TokenAmount,
    amount1: TokenAmount,
    reserve0: TokenAmount,
    reserve1: TokenAmount,
    total_supply: TokenAmount,
) -> Result<TokenAmount, ExchangeError> {
    if reserve0.is_zero() || reserve1.is_zero() || total_supply.is_zero() {
        return Err(ExchangeError::validation("pool has no liquidity"));
    }

    let liquidity0 = amount0
        .0
        .checked_mul(total_supply.0)
        .ok_or_else(|| ExchangeError::validation("amount0 out of range"))?
        / reserve0.0;
    let liquidity1 = amount1
        .0
        .checked_mul(total_supply.0)
        .ok_or_else(|| ExchangeError::validation("amount1 out of range"))?
        / reserve1.0;

    Ok(TokenAmount(liquidity0.min(liquidity1)))
}
