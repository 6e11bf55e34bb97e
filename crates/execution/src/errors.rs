//! Operation errors with partial-completion reporting.
//!
//! Operations never roll back: a confirmed sub-transaction stays
//! confirmed even when a later one fails. Every failure therefore carries
//! the list of sub-steps that already landed, so a caller can tell a
//! clean rejection from a half-finished operation.

use crate::sequencer::SequencerError;
use amm_domain::prelude::ExchangeError;
use amm_ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

/// One confirmed sub-transaction of a multi-step operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreatePool,
    ApproveToken0,
    ApproveToken1,
    AddLiquidity,
    RemoveLiquidity,
    ApproveTokenIn,
    Swap,
}

/// The cause of an operation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Domain(#[from] ExchangeError),

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),

    #[error("sequencer failure: {0}")]
    Sequencer(#[from] SequencerError),
}

/// An operation failure plus the confirmed sub-steps that preceded it.
///
/// `completed` is empty when the operation was rejected before any write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation failed after {completed:?}: {source}")]
pub struct OperationFailure {
    pub completed: Vec<Step>,
    #[source]
    pub source: ExecutionError,
}

impl OperationFailure {
    /// A failure before any sub-transaction was confirmed.
    #[must_use]
    pub fn rejected(source: impl Into<ExecutionError>) -> Self {
        Self {
            completed: Vec::new(),
            source: source.into(),
        }
    }
}

/// Running record of confirmed sub-steps within one operation task.
#[derive(Debug, Default)]
pub(crate) struct StepLog {
    completed: Vec<Step>,
}

impl StepLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn confirm(&mut self, step: Step) {
        self.completed.push(step);
    }

    /// Builds the failure for the current progress.
    pub(crate) fn fail(&self, source: impl Into<ExecutionError>) -> OperationFailure {
        OperationFailure {
            completed: self.completed.clone(),
            source: source.into(),
        }
    }
}
