//! Convenient re-exports of the ledger boundary types.

pub use crate::events::{EventMeta, LedgerEvent, PoolEvent};
pub use crate::memory::MemoryLedger;
pub use crate::receipt::Receipt;
pub use crate::{ContractCall, Ledger, LedgerError, LedgerReader, LedgerWriter, TokenMetadata};
