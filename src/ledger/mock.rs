//! Instrumented store for testing
//!
//! Wraps another `LedgerStore`, records every call in order and can be told
//! to fail at a chosen step of the unit of work.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::error::LedgerError;
use super::models::{Account, Entry, Transfer};
use super::store::{LedgerStore, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Begin,
    InsertTransfer(i64, i64),
    InsertEntry(i64, i64),
    AdjustBalance(i64, i64),
    GetAccount(i64),
    Commit,
    Abort,
}

/// Step at which the wrapped unit of work reports an `Internal` error.
/// Counters are 1-based per unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    InsertTransfer,
    InsertEntry(usize),
    AdjustBalance(usize),
    Commit,
}

pub struct InstrumentedStore<S> {
    inner: S,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    fail_at: Option<FailAt>,
    commit_delay: Option<Duration>,
}

impl<S: LedgerStore> InstrumentedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_at: None,
            commit_delay: None,
        }
    }

    pub fn failing(inner: S, fail_at: FailAt) -> Self {
        Self {
            fail_at: Some(fail_at),
            ..Self::new(inner)
        }
    }

    /// Commit reaches the inner store, then the acknowledgement is held
    /// back for `delay`.
    pub fn slow_commit_ack(inner: S, delay: Duration) -> Self {
        Self {
            commit_delay: Some(delay),
            ..Self::new(inner)
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

fn injected(step: &str) -> LedgerError {
    LedgerError::Internal(format!("injected failure at {}", step))
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for InstrumentedStore<S> {
    type Tx = InstrumentedUnitOfWork<S::Tx>;

    async fn begin(&self) -> Result<Self::Tx, LedgerError> {
        self.calls.lock().unwrap().push(StoreCall::Begin);
        let inner = self.inner.begin().await?;
        Ok(InstrumentedUnitOfWork {
            inner,
            calls: self.calls.clone(),
            fail_at: self.fail_at,
            commit_delay: self.commit_delay,
            entries: 0,
            adjustments: 0,
        })
    }
}

pub struct InstrumentedUnitOfWork<T> {
    inner: T,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    fail_at: Option<FailAt>,
    commit_delay: Option<Duration>,
    entries: usize,
    adjustments: usize,
}

impl<T> InstrumentedUnitOfWork<T> {
    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<T: UnitOfWork> UnitOfWork for InstrumentedUnitOfWork<T> {
    async fn insert_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        self.record(StoreCall::InsertTransfer(from_account_id, to_account_id));
        if self.fail_at == Some(FailAt::InsertTransfer) {
            return Err(injected("insert_transfer"));
        }
        self.inner
            .insert_transfer(from_account_id, to_account_id, amount)
            .await
    }

    async fn insert_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, LedgerError> {
        self.record(StoreCall::InsertEntry(account_id, amount));
        self.entries += 1;
        if self.fail_at == Some(FailAt::InsertEntry(self.entries)) {
            return Err(injected("insert_entry"));
        }
        self.inner.insert_entry(account_id, amount).await
    }

    async fn adjust_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, LedgerError> {
        self.record(StoreCall::AdjustBalance(account_id, delta));
        self.adjustments += 1;
        if self.fail_at == Some(FailAt::AdjustBalance(self.adjustments)) {
            return Err(injected("adjust_account_balance"));
        }
        self.inner.adjust_account_balance(account_id, delta).await
    }

    async fn get_account(&mut self, account_id: i64) -> Result<Account, LedgerError> {
        self.record(StoreCall::GetAccount(account_id));
        self.inner.get_account(account_id).await
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.record(StoreCall::Commit);
        if self.fail_at == Some(FailAt::Commit) {
            // Inner unit of work is dropped uncommitted.
            return Err(injected("commit"));
        }
        self.inner.commit().await?;
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn abort(self) -> Result<(), LedgerError> {
        self.record(StoreCall::Abort);
        self.inner.abort().await
    }
}
