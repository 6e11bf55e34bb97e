//! Write-path execution for the exchange control plane.
//!
//! Three pieces cooperate here:
//!
//! - [`sequencer::NonceSequencer`] serializes every mutating operation for
//!   one signing account, so consecutive nonce fetches never race.
//! - [`orchestrator::Orchestrator`] runs the multi-transaction operations
//!   (pool creation, liquidity management, swaps) inside sequencer tasks,
//!   fetching nonces from the ledger as it goes.
//! - [`registry::PoolRegistry`] is the read-only counterpart: best-effort
//!   listings of pools and tokens that drop failing items instead of
//!   failing wholesale.
//!
//! [`sync::Reconciler`] periodically re-reads authoritative pool state and
//! repairs the materialized view when it diverges.

/// Operation errors and partial-completion reporting.
pub mod errors;
/// Multi-transaction operation driver.
pub mod orchestrator;
/// Prelude module for convenient imports.
pub mod prelude;
/// Best-effort read surface.
pub mod registry;
/// Per-signer serialization.
pub mod sequencer;
/// Materialized-view reconciliation.
pub mod sync;
