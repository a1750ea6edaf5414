//! Ledger store traits
//!
//! The transfer engine talks to storage only through these two traits.
//! A `UnitOfWork` is one transaction: its writes become visible together
//! on `commit`, or not at all.

use async_trait::async_trait;

use super::error::LedgerError;
use super::models::{Account, Entry, Transfer};

/// Transactional storage for accounts, entries and transfers
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: UnitOfWork;

    /// Open a unit of work (read committed or stronger)
    async fn begin(&self) -> Result<Self::Tx, LedgerError>;
}

/// One open transaction against a `LedgerStore`.
///
/// Dropping an open unit of work aborts it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError>;

    async fn insert_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, LedgerError>;

    /// `balance += delta` as one atomic, row-locking store operation.
    ///
    /// The row lock is held until the unit of work ends. Returns the row as
    /// seen by this unit of work after the adjustment.
    async fn adjust_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, LedgerError>;

    async fn get_account(&mut self, account_id: i64) -> Result<Account, LedgerError>;

    async fn commit(self) -> Result<(), LedgerError>;

    async fn abort(self) -> Result<(), LedgerError>;
}
