//! Repository layer for ledger tables
//!
//! Plain single-row operations used by callers around the transfer engine.
//! Each takes any Postgres executor, so it runs on the pool or inside an
//! open transaction.

use sqlx::{Executor, Postgres};

use super::error::LedgerError;
use super::models::{
    Account, CreateAccountParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, Transfer,
};

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Account repository for CRUD operations
pub struct AccountRepository;

impl AccountRepository {
    pub async fn create<'e, E>(
        executor: E,
        params: &CreateAccountParams,
    ) -> Result<Account, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account: Account = sqlx::query_as(
            r#"
            INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(&params.currency)
        .fetch_one(executor)
        .await?;

        Ok(account)
    }

    pub async fn get_by_id<'e, E>(executor: E, account_id: i64) -> Result<Account, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account: Option<Account> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at FROM accounts WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(executor)
        .await?;

        account.ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    /// Read and row-lock an account until the surrounding transaction ends.
    ///
    /// `FOR NO KEY UPDATE` does not block concurrent inserts of entries or
    /// transfers that reference this account.
    pub async fn get_for_update<'e, E>(
        executor: E,
        account_id: i64,
    ) -> Result<Account, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account: Option<Account> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1 FOR NO KEY UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(executor)
        .await?;

        account.ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    pub async fn list<'e, E>(
        executor: E,
        params: &ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let accounts: Vec<Account> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at FROM accounts
            WHERE owner = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&params.owner)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(executor)
        .await?;

        Ok(accounts)
    }

    /// Overwrite the balance. Never used by the transfer engine.
    pub async fn update_balance<'e, E>(
        executor: E,
        account_id: i64,
        balance: i64,
    ) -> Result<Account, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account: Option<Account> = sqlx::query_as(
            r#"
            UPDATE accounts SET balance = $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(account_id)
        .bind(balance)
        .fetch_optional(executor)
        .await?;

        account.ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    /// Atomic `balance += delta`, returning the row after adjustment
    pub async fn add_balance<'e, E>(
        executor: E,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account: Option<Account> = sqlx::query_as(
            r#"
            UPDATE accounts SET balance = balance + $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_optional(executor)
        .await?;

        account.ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    /// Delete an account. Accounts with ledger history cannot be deleted.
    pub async fn delete<'e, E>(executor: E, account_id: i64) -> Result<(), LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(account_id)
            .execute(executor)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err)
                    if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
                {
                    LedgerError::InvalidArgument(format!(
                        "account {} has ledger entries",
                        account_id
                    ))
                }
                _ => LedgerError::from(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::account_not_found(account_id));
        }
        Ok(())
    }
}

/// Entry repository
pub struct EntryRepository;

impl EntryRepository {
    pub async fn create<'e, E>(
        executor: E,
        account_id: i64,
        amount: i64,
    ) -> Result<Entry, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry: Entry = sqlx::query_as(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(executor)
        .await?;

        Ok(entry)
    }

    pub async fn get_by_id<'e, E>(executor: E, entry_id: i64) -> Result<Entry, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry: Option<Entry> = sqlx::query_as(
            r#"
            SELECT id, account_id, amount, created_at FROM entries WHERE id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(executor)
        .await?;

        entry.ok_or_else(|| LedgerError::NotFound(format!("entry {}", entry_id)))
    }

    pub async fn list<'e, E>(
        executor: E,
        params: &ListEntriesParams,
    ) -> Result<Vec<Entry>, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries: Vec<Entry> = sqlx::query_as(
            r#"
            SELECT id, account_id, amount, created_at FROM entries
            WHERE account_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(params.account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(executor)
        .await?;

        Ok(entries)
    }
}

/// Transfer repository
pub struct TransferRepository;

impl TransferRepository {
    pub async fn create<'e, E>(
        executor: E,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
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
        .fetch_one(executor)
        .await?;

        Ok(transfer)
    }

    pub async fn get_by_id<'e, E>(executor: E, transfer_id: i64) -> Result<Transfer, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let transfer: Option<Transfer> = sqlx::query_as(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(executor)
        .await?;

        transfer.ok_or_else(|| LedgerError::NotFound(format!("transfer {}", transfer_id)))
    }

    /// Transfers leaving `from_account_id` or arriving at `to_account_id`
    pub async fn list<'e, E>(
        executor: E,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let transfers: Vec<Transfer> = sqlx::query_as(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $2
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(executor)
        .await?;

        Ok(transfers)
    }
}
