//! Per-signer operation serialization.
//!
//! Every mutating operation against the ledger runs as one exclusive task
//! per signing account: at most one task executes at a time, waiters are
//! served in FIFO order, and the slot is released when the task finishes
//! on any path. The task future is spawned onto the runtime holding the
//! owned permit, so a caller that stops awaiting the operation (timeout,
//! dropped connection) never cancels a task that may already have
//! broadcast a transaction.

use amm_domain::prelude::Address;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;
use uuid::Uuid;

tokio::task_local! {
    /// Id of the exclusive task the current tokio task is running inside,
    /// if any. Used to reject nested acquisition instead of deadlocking.
    static EXCLUSIVE_TASK: Uuid;
}

/// Failures of the serialization machinery itself, as opposed to failures
/// of the task it ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// `run_exclusive` was called from inside a running exclusive task.
    /// Awaiting the slot there would deadlock: the slot is held by the
    /// very task doing the waiting.
    #[error("nested exclusive acquisition from task {outer}")]
    Reentrant { outer: Uuid },

    /// The spawned task panicked or was aborted by runtime shutdown.
    #[error("exclusive task died: {0}")]
    TaskDied(String),
}

/// Serializes exclusive tasks for one signing account.
///
/// Backed by a single-permit fair [`Semaphore`]; fairness gives waiters
/// the slot in arrival order.
pub struct NonceSequencer {
    signer: Address,
    slot: Arc<Semaphore>,
}

impl NonceSequencer {
    #[must_use]
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    #[must_use]
    pub fn signer(&self) -> &Address {
        &self.signer
    }

    /// Runs `task` as the signer's exclusive task.
    ///
    /// Waits for the slot (FIFO among concurrent callers), then spawns the
    /// task future with the permit moved into it. The permit drops when
    /// the task returns or panics, never earlier; cancelling the returned
    /// future after the task has been spawned does not cancel the task.
    ///
    /// # Errors
    /// [`SequencerError::Reentrant`] when called from inside a running
    /// exclusive task, [`SequencerError::TaskDied`] when the task
    /// panicked.
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        label: &'static str,
        task: F,
    ) -> Result<T, SequencerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if let Ok(outer) = EXCLUSIVE_TASK.try_with(|id| *id) {
            return Err(SequencerError::Reentrant { outer });
        }

        let task_id = Uuid::new_v4();
        debug!(signer = %self.signer, %task_id, label, "Waiting for signer slot");
        let permit = self
            .slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SequencerError::TaskDied(e.to_string()))?;
        debug!(%task_id, label, "Acquired signer slot");

        let handle = tokio::spawn(EXCLUSIVE_TASK.scope(task_id, async move {
            let _permit = permit;
            let output = task().await;
            debug!(%task_id, label, "Releasing signer slot");
            output
        }));

        handle
            .await
            .map_err(|e| SequencerError::TaskDied(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::task::yield_now;
    use tokio::time::sleep;

    fn sequencer() -> Arc<NonceSequencer> {
        Arc::new(NonceSequencer::new(Address::from_low_u64(0xbeef)))
    }

    #[tokio::test]
    async fn test_tasks_never_overlap() {
        let seq = sequencer();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let seq = seq.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                seq.run_exclusive("probe", move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiters_run_in_submission_order() {
        let seq = sequencer();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Park a task in the slot so every waiter below has to queue.
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let holder = {
            let seq = seq.clone();
            let entered = entered.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                seq.run_exclusive("holder", move || async move {
                    entered.notify_one();
                    gate.notified().await;
                })
                .await
            })
        };
        entered.notified().await;

        let mut waiters = Vec::new();
        for i in 0..6 {
            let seq = seq.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                seq.run_exclusive("waiter", move || async move {
                    order.lock().unwrap().push(i);
                })
                .await
            }));
            // Let this waiter reach the queue before spawning the next,
            // so submission order is well defined.
            for _ in 0..4 {
                yield_now().await;
            }
        }

        gate.notify_one();
        holder.await.unwrap().unwrap();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..6).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrent_callers_observe_gap_free_nonces() {
        let seq = sequencer();
        // Stand-in for the ledger's per-signer transaction counter.
        let counter = Arc::new(AtomicU64::new(0));
        let submitted = Arc::new(Mutex::new(Vec::new()));

        let mut callers = Vec::new();
        for _ in 0..8 {
            let seq = seq.clone();
            let counter = counter.clone();
            let submitted = submitted.clone();
            callers.push(tokio::spawn(async move {
                seq.run_exclusive("submit", move || async move {
                    // Fetch inside the task, as the orchestrator does.
                    let nonce = counter.load(Ordering::SeqCst);
                    // Without mutual exclusion another caller could read
                    // the same value across this await point.
                    yield_now().await;
                    counter.store(nonce + 1, Ordering::SeqCst);
                    submitted.lock().unwrap().push(nonce);
                })
                .await
            }));
        }
        for caller in callers {
            caller.await.unwrap().unwrap();
        }

        let mut nonces = submitted.lock().unwrap().clone();
        nonces.sort_unstable();
        assert_eq!(nonces, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_slot_released_after_task_error() {
        let seq = sequencer();

        let failed: Result<Result<(), String>, _> = seq
            .run_exclusive("failing", || async { Err("boom".to_string()) })
            .await;
        assert_eq!(failed.unwrap(), Err("boom".to_string()));

        // The slot must be free again.
        let ok = seq.run_exclusive("after", || async { 42 }).await.unwrap();
        assert_eq!(ok, 42);
    }

    #[tokio::test]
    async fn test_nested_acquisition_is_rejected() {
        let seq = sequencer();
        let inner_seq = seq.clone();

        let inner_result = seq
            .run_exclusive("outer", move || async move {
                inner_seq.run_exclusive("inner", || async {}).await
            })
            .await
            .unwrap();

        assert!(matches!(
            inner_result,
            Err(SequencerError::Reentrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_caller_cancellation_does_not_abort_running_task() {
        let seq = sequencer();
        let started = Arc::new(Notify::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let task_started = started.clone();
        let task_finished = finished.clone();
        let task_seq = seq.clone();
        let caller = tokio::spawn(async move {
            task_seq
                .run_exclusive("doomed-caller", move || async move {
                    task_started.notify_one();
                    sleep(Duration::from_millis(20)).await;
                    task_finished.fetch_add(1, Ordering::SeqCst);
                })
                .await
        });

        started.notified().await;
        caller.abort();

        // The spawned task keeps running to completion and frees the slot.
        seq.run_exclusive("next", || async {}).await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
