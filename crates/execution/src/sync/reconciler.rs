//! Periodic reconciliation of stored pools against the ledger.
//!
//! The event-sourced view can drift from the ledger when events are
//! missed or delivered late. The ledger is authoritative: each pass
//! re-reads live reserves and share supply for every stored pool and
//! overwrites the stored row on mismatch, logging both values.

use amm_domain::prelude::{Address, Pool};
use amm_ledger::prelude::LedgerReader;
use amm_store::EntityStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Reconciliation tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Delay between passes.
    pub interval: Duration,
    /// Consecutive per-pool read failures before the pool is marked
    /// [`PoolSyncStatus::Failed`].
    pub max_failures: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_failures: 3,
        }
    }
}

/// Outcome of the most recent pass for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSyncStatus {
    /// Stored state matched the ledger.
    InSync,
    /// Stored state diverged and was overwritten from the ledger.
    Divergent,
    /// Live reads kept failing; the pool's stored state is unverified.
    Failed,
}

#[derive(Debug, Default)]
struct PoolHealth {
    status: Option<PoolSyncStatus>,
    consecutive_failures: u32,
}

/// Re-reads authoritative pool state and repairs the store.
pub struct Reconciler {
    ledger: Arc<dyn LedgerReader>,
    store: Arc<dyn EntityStore>,
    config: ReconcilerConfig,
    health: RwLock<HashMap<Address, PoolHealth>>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        store: Arc<dyn EntityStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            config,
            health: RwLock::new(HashMap::new()),
        }
    }

    /// Status of a pool after its most recent pass, if it has been seen.
    pub async fn status(&self, pool: &Address) -> Option<PoolSyncStatus> {
        self.health.read().await.get(pool).and_then(|h| h.status)
    }

    /// Runs one pass over every stored pool. Returns how many pools were
    /// corrected.
    ///
    /// # Errors
    /// Fails only when the stored pool list cannot be read; per-pool
    /// failures are counted and logged instead.
    pub async fn reconcile_all(&self) -> anyhow::Result<usize> {
        let pools = self.store.list_pools().await?;
        let mut corrected = 0;

        for mut pool in pools {
            let address = pool.address.clone();
            match self.reconcile_pool(&mut pool).await {
                Ok(true) => {
                    corrected += 1;
                    self.record(&address, PoolSyncStatus::Divergent).await;
                }
                Ok(false) => self.record(&address, PoolSyncStatus::InSync).await,
                Err(e) => {
                    warn!(pool = %address, error = %e, "Pool reconcile read failed");
                    self.record_failure(&address).await;
                }
            }
        }
        Ok(corrected)
    }

    /// Spawns the interval loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.interval);
            loop {
                ticker.tick().await;
                match this.reconcile_all().await {
                    Ok(0) => debug!("Reconcile pass found no divergence"),
                    Ok(corrected) => info!(corrected, "Reconcile pass corrected pools"),
                    Err(e) => error!(error = %e, "Reconcile pass failed"),
                }
            }
        })
    }

    async fn reconcile_pool(&self, pool: &mut Pool) -> anyhow::Result<bool> {
        let (live0, live1) = self.ledger.reserves(&pool.address).await?;
        let lp_token = self.ledger.lp_token(&pool.address).await?;
        let live_supply = self.ledger.total_supply(&lp_token).await?;

        if pool.reserve0 == live0 && pool.reserve1 == live1 && pool.total_supply == live_supply {
            return Ok(false);
        }

        warn!(
            pool = %pool.address,
            stored_reserve0 = %pool.reserve0,
            stored_reserve1 = %pool.reserve1,
            stored_supply = %pool.total_supply,
            live_reserve0 = %live0,
            live_reserve1 = %live1,
            live_supply = %live_supply,
            "Stored pool diverged from ledger, overwriting"
        );
        pool.reserve0 = live0;
        pool.reserve1 = live1;
        pool.total_supply = live_supply;
        self.store.save_pool(pool).await?;
        Ok(true)
    }

    async fn record(&self, pool: &Address, status: PoolSyncStatus) {
        let mut health = self.health.write().await;
        let entry = health.entry(pool.clone()).or_default();
        entry.status = Some(status);
        entry.consecutive_failures = 0;
    }

    async fn record_failure(&self, pool: &Address) {
        let mut health = self.health.write().await;
        let entry = health.entry(pool.clone()).or_default();
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.config.max_failures {
            entry.status = Some(PoolSyncStatus::Failed);
            error!(
                %pool,
                failures = entry.consecutive_failures,
                "Pool unverifiable, marking failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amm_domain::prelude::TokenAmount;
    use amm_ledger::prelude::{ContractCall, LedgerWriter, MemoryLedger};
    use amm_store::memory::MemoryStore;

    fn signer() -> Address {
        Address::from_low_u64(0xbeef)
    }

    async fn ledger_with_pool() -> (Arc<MemoryLedger>, Address, Address, Address) {
        let ledger = Arc::new(MemoryLedger::new(signer()));
        let token_a = ledger
            .deploy_token("TKA", "Token A", 6, TokenAmount::from(1_000_000u64))
            .await;
        let token_b = ledger
            .deploy_token("TKB", "Token B", 6, TokenAmount::from(1_000_000u64))
            .await;
        let tx = ledger
            .submit(
                ContractCall::CreatePool {
                    token0: token_a.clone(),
                    token1: token_b.clone(),
                },
                0,
            )
            .await
            .unwrap();
        let receipt = ledger.await_receipt(&tx).await.unwrap();
        let (pool, token0, token1) = receipt.find_pool_created().unwrap();
        (ledger, pool, token0, token1)
    }

    #[tokio::test]
    async fn test_divergent_pool_is_overwritten_from_ledger() {
        let (ledger, pool, token0, token1) = ledger_with_pool().await;
        let store = Arc::new(MemoryStore::new());

        // Stored view claims reserves the ledger never saw.
        let mut stored = Pool::new(pool.clone(), token0, token1, 1_700_000_001, 1);
        stored.reserve0 = TokenAmount::from(5u64);
        store.save_pool(&stored).await.unwrap();

        let reconciler = Reconciler::new(ledger, store.clone(), ReconcilerConfig::default());
        assert_eq!(reconciler.reconcile_all().await.unwrap(), 1);
        assert_eq!(
            reconciler.status(&pool).await,
            Some(PoolSyncStatus::Divergent)
        );

        let repaired = store.get_pool(&pool).await.unwrap().unwrap();
        assert_eq!(repaired.reserve0, TokenAmount::zero());

        // A second pass finds nothing to do.
        assert_eq!(reconciler.reconcile_all().await.unwrap(), 0);
        assert_eq!(reconciler.status(&pool).await, Some(PoolSyncStatus::InSync));
    }

    #[tokio::test]
    async fn test_repeated_read_failures_mark_pool_failed() {
        let (ledger, _, token0, token1) = ledger_with_pool().await;
        let store = Arc::new(MemoryStore::new());

        // A pool the ledger does not know.
        let phantom = Address::from_low_u64(0xdead);
        store
            .save_pool(&Pool::new(phantom.clone(), token0, token1, 1_700_000_001, 1))
            .await
            .unwrap();

        let config = ReconcilerConfig {
            max_failures: 2,
            ..ReconcilerConfig::default()
        };
        let reconciler = Reconciler::new(ledger, store, config);

        reconciler.reconcile_all().await.unwrap();
        assert_eq!(reconciler.status(&phantom).await, None);

        reconciler.reconcile_all().await.unwrap();
        assert_eq!(
            reconciler.status(&phantom).await,
            Some(PoolSyncStatus::Failed)
        );
    }
}
