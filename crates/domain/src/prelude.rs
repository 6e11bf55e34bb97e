//! Convenient re-exports of the types used across the workspace.

pub use crate::entities::liquidity_change::LiquidityChange;
pub use crate::entities::pool::{POOL_FEE_BPS, Pool};
pub use crate::entities::position::LiquidityPosition;
pub use crate::entities::swap::Swap;
pub use crate::entities::token::Token;
pub use crate::enums::ChangeKind;
pub use crate::errors::ExchangeError;
pub use crate::math::shares::{shares_for_amounts, swap_fee};
pub use crate::value_objects::address::{Address, canonical_pair};
pub use crate::value_objects::amount::{Amount, TokenAmount};
pub use crate::value_objects::tx::{EventId, TxHash};
