//! Transfer Transaction Engine
//!
//! Executes one transfer as one unit of work:
//!
//! ```text
//! begin ─▶ insert transfer ─▶ insert entries (−X, +X)
//!       ─▶ adjust balances, lower account id first ─▶ commit
//! ```
//!
//! Balance adjustments are issued in ascending account-id order whatever
//! the direction, so A→B and B→A running concurrently request the two row
//! locks in the same order and cannot wait on each other in a cycle.
//!
//! The engine never retries. A retried unit of work would insert a second
//! transfer row, so whether to reissue a `Conflict` is the caller's call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::LedgerError;
use super::models::{Account, Entry, Transfer, TransferParams, TransferResult};
use super::store::{LedgerStore, UnitOfWork};

/// Stateless transfer executor over a `LedgerStore`
pub struct TransferEngine<S> {
    store: S,
    /// Deadline for opening the unit of work and issuing its writes.
    /// Commit runs unbounded.
    timeout: Option<Duration>,
}

impl<S: LedgerStore> TransferEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Move `amount` from one account to another.
    ///
    /// Invalid parameters are rejected before the store is touched. On any
    /// later failure the unit of work is aborted and nothing is visible.
    /// No sufficient-funds check is made: the source may go negative.
    pub async fn execute_transfer(
        &self,
        params: TransferParams,
    ) -> Result<TransferResult, LedgerError> {
        params.validate()?;

        debug!(
            from = params.from_account_id,
            to = params.to_account_id,
            amount = params.amount,
            "Transfer started"
        );

        let outcome = self.run(params).await;

        match &outcome {
            Ok(result) => info!(
                transfer_id = result.transfer.id,
                from = params.from_account_id,
                to = params.to_account_id,
                amount = params.amount,
                from_balance = result.from_account.balance,
                to_balance = result.to_account.balance,
                "Transfer committed"
            ),
            Err(e) => warn!(
                from = params.from_account_id,
                to = params.to_account_id,
                amount = params.amount,
                code = e.code(),
                error = %e,
                "Transfer aborted"
            ),
        }

        outcome
    }

    async fn run(&self, params: TransferParams) -> Result<TransferResult, LedgerError> {
        let deadline = self.timeout.map(|limit| Instant::now() + limit);

        let mut tx = within(deadline, self.store.begin()).await?;

        // The deadline stops here; commit reports its own outcome.
        match within(deadline, apply(&mut tx, params)).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(abort_err) = tx.abort().await {
                    warn!(error = %abort_err, "Abort after failed transfer also failed");
                }
                Err(e)
            }
        }
    }
}

/// Run `fut` until `deadline`; expiry drops it and yields `Conflict`.
async fn within<F, R>(deadline: Option<Instant>, fut: F) -> Result<R, LedgerError>
where
    F: Future<Output = Result<R, LedgerError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .unwrap_or_else(|elapsed| Err(elapsed.into())),
        None => fut.await,
    }
}

/// All writes of one transfer inside an open unit of work
async fn apply<T: UnitOfWork>(
    tx: &mut T,
    params: TransferParams,
) -> Result<TransferResult, LedgerError> {
    let TransferParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let transfer: Transfer = tx
        .insert_transfer(from_account_id, to_account_id, amount)
        .await?;
    let from_entry: Entry = tx.insert_entry(from_account_id, -amount).await?;
    let to_entry: Entry = tx.insert_entry(to_account_id, amount).await?;

    let (from_account, to_account) = adjust_in_lock_order(tx, &params).await?;

    Ok(TransferResult {
        transfer,
        from_entry,
        to_entry,
        from_account,
        to_account,
    })
}

/// Debit and credit, lower account id first.
///
/// Each account is adjusted exactly once, so the rows returned by the
/// adjustments carry the post-transfer balances.
async fn adjust_in_lock_order<T: UnitOfWork>(
    tx: &mut T,
    params: &TransferParams,
) -> Result<(Account, Account), LedgerError> {
    let mut from_account = None;
    let mut to_account = None;

    for account_id in params.lock_order() {
        if account_id == params.from_account_id {
            from_account = Some(tx.adjust_account_balance(account_id, -params.amount).await?);
        } else {
            to_account = Some(tx.adjust_account_balance(account_id, params.amount).await?);
        }
    }

    match (from_account, to_account) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(LedgerError::Internal(
            "balance adjustment skipped an account".to_string(),
        )),
    }
}
