use crate::value_objects::address::Address;
use crate::value_objects::amount::TokenAmount;
use crate::value_objects::tx::EventId;
use serde::{Deserialize, Serialize};

/// Write-once record of one executed swap, keyed by (tx hash, log index).
///
/// The fee is recomputed from the fixed fee tier for reporting; the
/// authoritative deduction happened inside the pool contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub id: EventId,
    pub user: Address,
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: TokenAmount,
    pub amount_out: TokenAmount,
    pub fee: TokenAmount,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::tx::TxHash;

    #[test]
    fn test_swap_serializes_for_api_payloads() {
        let swap = Swap {
            id: EventId::new(TxHash::new("0xab"), 1),
            user: Address::from_low_u64(7),
            pool: Address::from_low_u64(100),
            token_in: Address::from_low_u64(1),
            token_out: Address::from_low_u64(2),
            amount_in: TokenAmount::from(1000u64),
            amount_out: TokenAmount::from(900u64),
            fee: TokenAmount::from(3u64),
            timestamp: 1_700_000_042,
        };

        let json = serde_json::to_value(&swap).unwrap();
        assert_eq!(json["user"], Address::from_low_u64(7).as_str());
        assert_eq!(json["timestamp"], 1_700_000_042u64);

        let back: Swap = serde_json::from_value(json).unwrap();
        assert_eq!(back, swap);
    }
}
