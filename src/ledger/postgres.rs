//! PostgreSQL Ledger Store
//!
//! Each unit of work is one `sqlx::Transaction`. Balance adjustments are a
//! single `UPDATE ... SET balance = balance + $delta RETURNING ...`, so the
//! row lock is taken and the increment applied by PostgreSQL itself.
//!
//! Inserting an entry or transfer only takes `FOR KEY SHARE` on the
//! referenced account rows, which does not conflict with the
//! `FOR NO KEY UPDATE` lock of the balance update.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::error::LedgerError;
use super::models::{Account, Entry, Transfer};
use super::store::{LedgerStore, UnitOfWork};

/// Ledger store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(PgUnitOfWork { tx })
    }
}

/// Open PostgreSQL transaction. Rolled back by sqlx if dropped.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        let transfer: Transfer = sqlx::query_as(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(transfer)
    }

    async fn insert_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, LedgerError> {
        let entry: Entry = sqlx::query_as(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(entry)
    }

    async fn adjust_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, LedgerError> {
        let account: Option<Account> = sqlx::query_as(
            r#"
            UPDATE accounts SET balance = balance + $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        account.ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    async fn get_account(&mut self, account_id: i64) -> Result<Account, LedgerError> {
        let account: Option<Account> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at FROM accounts WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        account.ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn abort(self) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
