//! Keeping the materialized view aligned with the ledger.

/// Periodic divergence repair.
pub mod reconciler;

pub use reconciler::{PoolSyncStatus, Reconciler, ReconcilerConfig};
