use crate::enums::ChangeKind;
use crate::value_objects::address::Address;
use crate::value_objects::amount::TokenAmount;
use crate::value_objects::tx::EventId;
use serde::{Deserialize, Serialize};

/// Write-once audit record of one liquidity addition or removal, keyed by
/// (tx hash, log index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityChange {
    pub id: EventId,
    pub user: Address,
    pub pool: Address,
    pub kind: ChangeKind,
    pub token0_amount: TokenAmount,
    pub token1_amount: TokenAmount,
    pub liquidity_amount: TokenAmount,
    pub timestamp: u64,
}
