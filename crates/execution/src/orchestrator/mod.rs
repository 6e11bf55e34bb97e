//! Multi-transaction operation driver.
//!
//! Each public operation runs as one exclusive sequencer task. Inside the
//! task, sub-transactions are strictly sequential: the next nonce is
//! fetched from the ledger immediately before each submission and is
//! never cached across tasks, so consecutive sub-transactions of one
//! operation get consecutive nonces and operations of different callers
//! cannot interleave.

use crate::errors::{OperationFailure, Step, StepLog};
use crate::sequencer::NonceSequencer;
use amm_domain::prelude::{
    Address, Amount, ExchangeError, TokenAmount, TxHash, canonical_pair, shares_for_amounts,
};
use amm_ledger::prelude::{ContractCall, Ledger};
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a successful pool creation, parsed from the receipt logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolCreation {
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub tx_hash: TxHash,
}

/// How much liquidity to withdraw.
///
/// Either an exact LP share count, or target token amounts converted to
/// shares against the live reserves with floor division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemoveLiquidityTarget {
    Shares(TokenAmount),
    Amounts(TokenAmount, TokenAmount),
}

/// Drives mutating exchange operations for one signing account.
///
/// The sequencer is injected, not owned: there must be exactly one
/// [`NonceSequencer`] per signing account in the process, shared by every
/// orchestrator writing for that account. The signer is taken from the
/// sequencer so the two cannot disagree.
pub struct Orchestrator {
    ledger: Arc<dyn Ledger>,
    signer: Address,
    sequencer: Arc<NonceSequencer>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, sequencer: Arc<NonceSequencer>) -> Self {
        let signer = sequencer.signer().clone();
        Self {
            ledger,
            signer,
            sequencer,
        }
    }

    #[must_use]
    pub fn sequencer(&self) -> &Arc<NonceSequencer> {
        &self.sequencer
    }

    /// Creates the pool for a token pair.
    ///
    /// The pair is canonicalized before the existence check, so both
    /// argument orders address the same pool.
    ///
    /// # Errors
    /// `Validation` for identical tokens, `Conflict` carrying the existing
    /// pool address when the pair already has one, `Integration` when the
    /// confirmed receipt carries no creation event.
    pub async fn create_pool(
        &self,
        token_a: Address,
        token_b: Address,
    ) -> Result<PoolCreation, OperationFailure> {
        let ledger = self.ledger.clone();
        let signer = self.signer.clone();
        self.run("create_pool", move || {
            Self::create_pool_task(ledger, signer, token_a, token_b)
        })
        .await
    }

    /// Deposits both tokens into a pool, approving each one first when its
    /// current allowance does not cover the deposit.
    ///
    /// Amounts are human-readable decimals, scaled by each token's
    /// on-ledger precision.
    ///
    /// # Errors
    /// Fails with the confirmed approvals listed when a later
    /// sub-transaction reverts.
    pub async fn add_liquidity(
        &self,
        pool: Address,
        amount0: Decimal,
        amount1: Decimal,
    ) -> Result<TxHash, OperationFailure> {
        let ledger = self.ledger.clone();
        let signer = self.signer.clone();
        self.run("add_liquidity", move || {
            Self::add_liquidity_task(ledger, signer, pool, amount0, amount1)
        })
        .await
    }

    /// Withdraws liquidity from a pool.
    ///
    /// # Errors
    /// `InsufficientBalance` when the signer holds fewer LP shares than
    /// the target requires; ledger failures otherwise.
    pub async fn remove_liquidity(
        &self,
        pool: Address,
        target: RemoveLiquidityTarget,
    ) -> Result<TxHash, OperationFailure> {
        let ledger = self.ledger.clone();
        let signer = self.signer.clone();
        self.run("remove_liquidity", move || {
            Self::remove_liquidity_task(ledger, signer, pool, target)
        })
        .await
    }

    /// Swaps `amount_in` of `token_in` against a pool, approving first
    /// when needed.
    ///
    /// # Errors
    /// `Validation` when `token_in` is not one of the pool's tokens,
    /// `InsufficientBalance` when the signer cannot fund the input.
    pub async fn swap(
        &self,
        pool: Address,
        token_in: Address,
        amount_in: Decimal,
    ) -> Result<TxHash, OperationFailure> {
        let ledger = self.ledger.clone();
        let signer = self.signer.clone();
        self.run("swap", move || {
            Self::swap_task(ledger, signer, pool, token_in, amount_in)
        })
        .await
    }

    async fn run<F, Fut, T>(&self, label: &'static str, task: F) -> Result<T, OperationFailure>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationFailure>> + Send + 'static,
        T: Send + 'static,
    {
        match self.sequencer.run_exclusive(label, task).await {
            Ok(result) => result,
            Err(e) => Err(OperationFailure::rejected(e)),
        }
    }

    async fn create_pool_task(
        ledger: Arc<dyn Ledger>,
        signer: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<PoolCreation, OperationFailure> {
        let mut steps = StepLog::new();

        if token_a == token_b {
            return Err(steps.fail(ExchangeError::validation(format!(
                "cannot pair token {token_a} with itself"
            ))));
        }
        let (token0, token1) = canonical_pair(token_a, token_b);

        if let Some(existing) = ledger
            .pool_for_pair(&token0, &token1)
            .await
            .map_err(|e| steps.fail(e))?
        {
            return Err(steps.fail(ExchangeError::Conflict { existing }));
        }

        let nonce = ledger
            .transaction_count(&signer)
            .await
            .map_err(|e| steps.fail(e))?;
        let tx_hash = ledger
            .submit(
                ContractCall::CreatePool {
                    token0: token0.clone(),
                    token1: token1.clone(),
                },
                nonce,
            )
            .await
            .map_err(|e| steps.fail(e))?;
        let receipt = ledger
            .await_receipt(&tx_hash)
            .await
            .map_err(|e| steps.fail(e))?;
        steps.confirm(Step::CreatePool);

        let Some((pool, token0, token1)) = receipt.find_pool_created() else {
            return Err(steps.fail(ExchangeError::integration(format!(
                "receipt {tx_hash} carries no pool creation event"
            ))));
        };

        info!(%pool, %token0, %token1, tx = %tx_hash, "Created pool");
        Ok(PoolCreation {
            pool,
            token0,
            token1,
            tx_hash,
        })
    }

    async fn add_liquidity_task(
        ledger: Arc<dyn Ledger>,
        signer: Address,
        pool: Address,
        amount0: Decimal,
        amount1: Decimal,
    ) -> Result<TxHash, OperationFailure> {
        let mut steps = StepLog::new();

        let (token0, token1) = ledger.pool_tokens(&pool).await.map_err(|e| steps.fail(e))?;
        let raw0 = Self::to_base_units(&ledger, &steps, &token0, amount0).await?;
        let raw1 = Self::to_base_units(&ledger, &steps, &token1, amount1).await?;

        Self::ensure_allowance(
            &ledger,
            &signer,
            &mut steps,
            &token0,
            &pool,
            raw0,
            Step::ApproveToken0,
        )
        .await?;
        Self::ensure_allowance(
            &ledger,
            &signer,
            &mut steps,
            &token1,
            &pool,
            raw1,
            Step::ApproveToken1,
        )
        .await?;

        let nonce = ledger
            .transaction_count(&signer)
            .await
            .map_err(|e| steps.fail(e))?;
        let tx_hash = ledger
            .submit(
                ContractCall::AddLiquidity {
                    pool: pool.clone(),
                    amount0: raw0,
                    amount1: raw1,
                },
                nonce,
            )
            .await
            .map_err(|e| steps.fail(e))?;
        ledger
            .await_receipt(&tx_hash)
            .await
            .map_err(|e| steps.fail(e))?;
        steps.confirm(Step::AddLiquidity);

        info!(%pool, amount0 = %raw0, amount1 = %raw1, tx = %tx_hash, "Added liquidity");
        Ok(tx_hash)
    }

    async fn remove_liquidity_task(
        ledger: Arc<dyn Ledger>,
        signer: Address,
        pool: Address,
        target: RemoveLiquidityTarget,
    ) -> Result<TxHash, OperationFailure> {
        let mut steps = StepLog::new();

        let lp_token = ledger.lp_token(&pool).await.map_err(|e| steps.fail(e))?;
        let balance = ledger
            .balance_of(&lp_token, &signer)
            .await
            .map_err(|e| steps.fail(e))?;

        let shares = match target {
            RemoveLiquidityTarget::Shares(shares) => shares,
            RemoveLiquidityTarget::Amounts(amount0, amount1) => {
                let (reserve0, reserve1) =
                    ledger.reserves(&pool).await.map_err(|e| steps.fail(e))?;
                let total_supply = ledger
                    .total_supply(&lp_token)
                    .await
                    .map_err(|e| steps.fail(e))?;
                shares_for_amounts(amount0, amount1, reserve0, reserve1, total_supply)
                    .map_err(|e| steps.fail(e))?
            }
        };

        if balance < shares {
            return Err(steps.fail(ExchangeError::InsufficientBalance {
                required: shares,
                available: balance,
            }));
        }

        let nonce = ledger
            .transaction_count(&signer)
            .await
            .map_err(|e| steps.fail(e))?;
        let tx_hash = ledger
            .submit(
                ContractCall::RemoveLiquidity {
                    pool: pool.clone(),
                    shares,
                },
                nonce,
            )
            .await
            .map_err(|e| steps.fail(e))?;
        ledger
            .await_receipt(&tx_hash)
            .await
            .map_err(|e| steps.fail(e))?;
        steps.confirm(Step::RemoveLiquidity);

        info!(%pool, %shares, tx = %tx_hash, "Removed liquidity");
        Ok(tx_hash)
    }

    async fn swap_task(
        ledger: Arc<dyn Ledger>,
        signer: Address,
        pool: Address,
        token_in: Address,
        amount_in: Decimal,
    ) -> Result<TxHash, OperationFailure> {
        let mut steps = StepLog::new();

        let (token0, token1) = ledger.pool_tokens(&pool).await.map_err(|e| steps.fail(e))?;
        if token_in != token0 && token_in != token1 {
            return Err(steps.fail(ExchangeError::validation(format!(
                "token {token_in} is not part of pool {pool}"
            ))));
        }

        let raw_in = Self::to_base_units(&ledger, &steps, &token_in, amount_in).await?;
        let balance = ledger
            .balance_of(&token_in, &signer)
            .await
            .map_err(|e| steps.fail(e))?;
        if balance < raw_in {
            return Err(steps.fail(ExchangeError::InsufficientBalance {
                required: raw_in,
                available: balance,
            }));
        }

        Self::ensure_allowance(
            &ledger,
            &signer,
            &mut steps,
            &token_in,
            &pool,
            raw_in,
            Step::ApproveTokenIn,
        )
        .await?;

        let nonce = ledger
            .transaction_count(&signer)
            .await
            .map_err(|e| steps.fail(e))?;
        let tx_hash = ledger
            .submit(
                ContractCall::Swap {
                    pool: pool.clone(),
                    token_in: token_in.clone(),
                    amount_in: raw_in,
                },
                nonce,
            )
            .await
            .map_err(|e| steps.fail(e))?;
        ledger
            .await_receipt(&tx_hash)
            .await
            .map_err(|e| steps.fail(e))?;
        steps.confirm(Step::Swap);

        info!(%pool, %token_in, amount_in = %raw_in, tx = %tx_hash, "Swapped");
        Ok(tx_hash)
    }

    /// Scales a human-readable amount by the token's on-ledger precision.
    async fn to_base_units(
        ledger: &Arc<dyn Ledger>,
        steps: &StepLog,
        token: &Address,
        amount: Decimal,
    ) -> Result<TokenAmount, OperationFailure> {
        let decimals = ledger.decimals(token).await.map_err(|e| steps.fail(e))?;
        Ok(Amount::from_decimal(amount, decimals)
            .map_err(|e| steps.fail(e))?
            .raw)
    }

    /// Approves `spender` for `required` when the current allowance falls
    /// short, confirming the approval before returning.
    async fn ensure_allowance(
        ledger: &Arc<dyn Ledger>,
        signer: &Address,
        steps: &mut StepLog,
        token: &Address,
        spender: &Address,
        required: TokenAmount,
        step: Step,
    ) -> Result<(), OperationFailure> {
        let allowance = ledger
            .allowance(token, signer, spender)
            .await
            .map_err(|e| steps.fail(e))?;
        if allowance >= required {
            debug!(%token, %spender, %allowance, "Allowance already sufficient");
            return Ok(());
        }

        let nonce = ledger
            .transaction_count(signer)
            .await
            .map_err(|e| steps.fail(e))?;
        let tx_hash = ledger
            .submit(
                ContractCall::Approve {
                    token: token.clone(),
                    spender: spender.clone(),
                    amount: required,
                },
                nonce,
            )
            .await
            .map_err(|e| steps.fail(e))?;
        ledger
            .await_receipt(&tx_hash)
            .await
            .map_err(|e| steps.fail(e))?;
        steps.confirm(step);

        debug!(%token, %spender, amount = %required, tx = %tx_hash, "Approved spending");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecutionError;
    use amm_ledger::prelude::MemoryLedger;
    use amm_ledger::LedgerReader;
    use rust_decimal_macros::dec;

    fn signer() -> Address {
        Address::from_low_u64(0xbeef)
    }

    /// One million units of a 6-decimals token.
    fn supply() -> TokenAmount {
        TokenAmount::from(1_000_000_000_000u64)
    }

    async fn setup() -> (Arc<MemoryLedger>, Orchestrator, Address, Address) {
        let ledger = Arc::new(MemoryLedger::new(signer()));
        let token_a = ledger.deploy_token("TKA", "Token A", 6, supply()).await;
        let token_b = ledger.deploy_token("TKB", "Token B", 6, supply()).await;
        let sequencer = Arc::new(NonceSequencer::new(signer()));
        let orchestrator = Orchestrator::new(ledger.clone(), sequencer);
        (ledger, orchestrator, token_a, token_b)
    }

    #[tokio::test]
    async fn test_create_pool_parses_creation_event() {
        let (ledger, orchestrator, token_a, token_b) = setup().await;

        let creation = orchestrator
            .create_pool(token_b.clone(), token_a.clone())
            .await
            .unwrap();

        // Canonical ordering regardless of argument order.
        assert!(creation.token0 < creation.token1);
        assert_eq!(
            ledger.pool_for_pair(&token_a, &token_b).await.unwrap(),
            Some(creation.pool)
        );
    }

    #[tokio::test]
    async fn test_create_pool_conflict_carries_existing_address() {
        let (_ledger, orchestrator, token_a, token_b) = setup().await;

        let creation = orchestrator
            .create_pool(token_a.clone(), token_b.clone())
            .await
            .unwrap();
        let failure = orchestrator
            .create_pool(token_b, token_a)
            .await
            .unwrap_err();

        assert!(failure.completed.is_empty());
        assert_eq!(
            failure.source,
            ExecutionError::Domain(ExchangeError::Conflict {
                existing: creation.pool
            })
        );
    }

    #[tokio::test]
    async fn test_create_pool_rejects_identical_tokens() {
        let (_ledger, orchestrator, token_a, _) = setup().await;
        let failure = orchestrator
            .create_pool(token_a.clone(), token_a)
            .await
            .unwrap_err();
        assert!(matches!(
            failure.source,
            ExecutionError::Domain(ExchangeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_add_liquidity_approves_then_deposits() {
        let (ledger, orchestrator, token_a, token_b) = setup().await;
        let creation = orchestrator.create_pool(token_a, token_b).await.unwrap();

        orchestrator
            .add_liquidity(creation.pool.clone(), dec!(1000), dec!(1000))
            .await
            .unwrap();

        let (r0, r1) = ledger.reserves(&creation.pool).await.unwrap();
        assert_eq!(r0, TokenAmount::from(1_000_000_000u64));
        assert_eq!(r1, TokenAmount::from(1_000_000_000u64));

        // create + approve0 + approve1 + add = 4 consecutive nonces.
        assert_eq!(ledger.transaction_count(&signer()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_add_liquidity_failure_reports_confirmed_approvals() {
        let (_ledger, orchestrator, token_a, token_b) = setup().await;
        let creation = orchestrator.create_pool(token_a, token_b).await.unwrap();

        // More than the signer's balance: both approvals confirm, the
        // deposit itself reverts.
        let failure = orchestrator
            .add_liquidity(creation.pool, dec!(2000000), dec!(2000000))
            .await
            .unwrap_err();

        assert_eq!(
            failure.completed,
            vec![Step::ApproveToken0, Step::ApproveToken1]
        );
        assert!(matches!(failure.source, ExecutionError::Ledger(_)));
    }

    #[tokio::test]
    async fn test_remove_liquidity_by_amounts() {
        let (ledger, orchestrator, token_a, token_b) = setup().await;
        let creation = orchestrator.create_pool(token_a, token_b).await.unwrap();
        orchestrator
            .add_liquidity(creation.pool.clone(), dec!(0.001), dec!(0.001))
            .await
            .unwrap();

        // Reserves and supply are all 1000 base units; withdrawing 10/10
        // needs exactly 10 shares.
        orchestrator
            .remove_liquidity(
                creation.pool.clone(),
                RemoveLiquidityTarget::Amounts(TokenAmount::from(10u64), TokenAmount::from(10u64)),
            )
            .await
            .unwrap();

        let (r0, r1) = ledger.reserves(&creation.pool).await.unwrap();
        assert_eq!(r0, TokenAmount::from(990u64));
        assert_eq!(r1, TokenAmount::from(990u64));

        let lp = ledger.lp_token(&creation.pool).await.unwrap();
        assert_eq!(
            ledger.balance_of(&lp, &signer()).await.unwrap(),
            TokenAmount::from(990u64)
        );
    }

    #[tokio::test]
    async fn test_remove_liquidity_checks_share_balance() {
        let (_ledger, orchestrator, token_a, token_b) = setup().await;
        let creation = orchestrator.create_pool(token_a, token_b).await.unwrap();
        orchestrator
            .add_liquidity(creation.pool.clone(), dec!(0.001), dec!(0.001))
            .await
            .unwrap();

        let failure = orchestrator
            .remove_liquidity(
                creation.pool,
                RemoveLiquidityTarget::Shares(TokenAmount::from(5000u64)),
            )
            .await
            .unwrap_err();

        assert!(failure.completed.is_empty());
        assert_eq!(
            failure.source,
            ExecutionError::Domain(ExchangeError::InsufficientBalance {
                required: TokenAmount::from(5000u64),
                available: TokenAmount::from(1000u64),
            })
        );
    }

    #[tokio::test]
    async fn test_swap_rejects_token_outside_pool() {
        let (ledger, orchestrator, token_a, token_b) = setup().await;
        let creation = orchestrator.create_pool(token_a, token_b).await.unwrap();
        let outsider = ledger.deploy_token("TKC", "Token C", 6, supply()).await;

        let failure = orchestrator
            .swap(creation.pool, outsider, dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.source,
            ExecutionError::Domain(ExchangeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_operations_get_gap_free_nonces() {
        let (ledger, orchestrator, token_a, token_b) = setup().await;
        let token_c = ledger.deploy_token("TKC", "Token C", 6, supply()).await;
        let token_d = ledger.deploy_token("TKD", "Token D", 6, supply()).await;

        let pool_ab = orchestrator
            .create_pool(token_a, token_b)
            .await
            .unwrap()
            .pool;
        let pool_cd = orchestrator
            .create_pool(token_c, token_d)
            .await
            .unwrap()
            .pool;

        let orchestrator = Arc::new(orchestrator);
        let mut handles = Vec::new();
        for pool in [pool_ab, pool_cd] {
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.add_liquidity(pool, dec!(10), dec!(10)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // 2 creates + 2 * (approve, approve, add): every nonce in 0..8 was
        // accepted, so the sequence had no gaps and no duplicates.
        assert_eq!(ledger.transaction_count(&signer()).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_orchestrators_sharing_a_sequencer_never_collide() {
        let (ledger, first, token_a, token_b) = setup().await;
        let token_c = ledger.deploy_token("TKC", "Token C", 6, supply()).await;
        let token_d = ledger.deploy_token("TKD", "Token D", 6, supply()).await;

        let pool_ab = first.create_pool(token_a, token_b).await.unwrap().pool;
        let pool_cd = first.create_pool(token_c, token_d).await.unwrap().pool;

        // A second writer for the same signer must share the per-signer
        // sequencer, otherwise its sub-transactions could interleave with
        // the first writer's and collide on nonces.
        let second = Orchestrator::new(ledger.clone(), first.sequencer().clone());

        let first = Arc::new(first);
        let second = Arc::new(second);
        let handles = vec![
            tokio::spawn({
                let first = first.clone();
                async move { first.add_liquidity(pool_ab, dec!(10), dec!(10)).await }
            }),
            tokio::spawn({
                let second = second.clone();
                async move { second.add_liquidity(pool_cd, dec!(10), dec!(10)).await }
            }),
        ];
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Strict nonce checking accepted every submission: 2 creates plus
        // 2 * (approve, approve, add) with no gaps or repeats.
        assert_eq!(ledger.transaction_count(&signer()).await.unwrap(), 8);
    }
}
