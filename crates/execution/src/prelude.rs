//! Convenient re-exports of the execution surface.

pub use crate::errors::{ExecutionError, OperationFailure, Step};
pub use crate::orchestrator::{Orchestrator, PoolCreation, RemoveLiquidityTarget};
pub use crate::registry::{PoolRegistry, PoolSummary, TokenSummary};
pub use crate::sequencer::{NonceSequencer, SequencerError};
pub use crate::sync::{PoolSyncStatus, Reconciler, ReconcilerConfig};
