//! Boundary to the external authoritative ledger.
//!
//! The control plane talks to the ledger through two async traits:
//! [`LedgerReader`] for view calls and event-log queries, and
//! [`LedgerWriter`] for submitting mutating contract calls with an
//! explicit nonce. [`MemoryLedger`](memory::MemoryLedger) is an
//! in-process implementation used by tests and local development.

/// Emitted events and their metadata.
pub mod events;
/// In-process ledger.
pub mod memory;
/// Prelude module for convenient imports.
pub mod prelude;
/// Transaction receipts.
pub mod receipt;

use amm_domain::prelude::{Address, TokenAmount, TxHash};
use async_trait::async_trait;
use events::LedgerEvent;
use receipt::Receipt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("nonce mismatch: submitted {submitted}, expected {expected}")]
    NonceMismatch { submitted: u64, expected: u64 },

    #[error("unknown contract {0}")]
    UnknownContract(Address),

    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHash),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("decode failure: {0}")]
    Decode(String),
}

/// A mutating contract call. Every variant maps onto one ledger write and
/// consumes exactly one nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    CreatePool {
        token0: Address,
        token1: Address,
    },
    AddLiquidity {
        pool: Address,
        amount0: TokenAmount,
        amount1: TokenAmount,
    },
    RemoveLiquidity {
        pool: Address,
        shares: TokenAmount,
    },
    Swap {
        pool: Address,
        token_in: Address,
        amount_in: TokenAmount,
    },
    Approve {
        token: Address,
        spender: Address,
        amount: TokenAmount,
    },
}

/// Best-effort token metadata from view calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: TokenAmount,
}

/// Read-only ledger surface: view calls and event-log queries.
///
/// Reads are unordered and may run concurrently with in-flight mutations;
/// callers observe an eventually consistent view.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Confirmed transaction count for an account, which is the next nonce.
    async fn transaction_count(&self, account: &Address) -> Result<u64, LedgerError>;

    /// Pool registered for a canonical token pair, if any.
    async fn pool_for_pair(
        &self,
        token0: &Address,
        token1: &Address,
    ) -> Result<Option<Address>, LedgerError>;

    /// The pool's constituent tokens, canonically ordered.
    async fn pool_tokens(&self, pool: &Address) -> Result<(Address, Address), LedgerError>;

    /// Live reserves.
    async fn reserves(&self, pool: &Address) -> Result<(TokenAmount, TokenAmount), LedgerError>;

    /// The pool's LP share token contract.
    async fn lp_token(&self, pool: &Address) -> Result<Address, LedgerError>;

    async fn balance_of(&self, token: &Address, owner: &Address)
    -> Result<TokenAmount, LedgerError>;

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<TokenAmount, LedgerError>;

    async fn total_supply(&self, token: &Address) -> Result<TokenAmount, LedgerError>;

    async fn decimals(&self, token: &Address) -> Result<u8, LedgerError>;

    async fn token_metadata(&self, token: &Address) -> Result<TokenMetadata, LedgerError>;

    /// All historical pool-creation events, in emission order.
    async fn pool_created_events(&self) -> Result<Vec<LedgerEvent>, LedgerError>;
}

/// Write surface: nonce-explicit submission and receipt retrieval.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Broadcasts a contract call under the given nonce and returns its
    /// transaction hash once accepted.
    async fn submit(&self, call: ContractCall, nonce: u64) -> Result<TxHash, LedgerError>;

    /// Waits for the transaction to confirm and returns its receipt with
    /// the ordered log list.
    async fn await_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError>;
}

/// Combined boundary used by the orchestrator.
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> Ledger for T {}
