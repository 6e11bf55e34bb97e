use crate::value_objects::address::Address;
use crate::value_objects::amount::TokenAmount;
use thiserror::Error;

/// Error taxonomy for control-plane operations and indexing.
///
/// `Validation` and `Conflict` are rejected before any ledger write.
/// `Consistency` is fatal to indexing of the affected pool and must never
/// be clamped away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("pool already exists at {existing}")]
    Conflict { existing: Address },

    #[error("ledger integration failure: {0}")]
    Integration(String),

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("consistency violation in pool {pool}: {detail}")]
    Consistency { pool: Address, detail: String },
}

impl ExchangeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn integration(msg: impl Into<String>) -> Self {
        Self::Integration(msg.into())
    }

    pub fn consistency(pool: Address, detail: impl Into<String>) -> Self {
        Self::Consistency {
            pool,
            detail: detail.into(),
        }
    }
}
