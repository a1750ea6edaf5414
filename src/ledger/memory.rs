//! In-Memory Ledger Store
//!
//! Behaves like a row-locking relational store:
//! - `adjust_account_balance` takes the account's row lock and keeps it
//!   until the unit of work commits or aborts
//! - lock waits are bounded by `lock_timeout` and surface as `Conflict`
//! - writes are buffered in the unit of work and published under a single
//!   table write lock at commit, so readers only ever see committed state
//!
//! Ids come from per-table sequences; ids of aborted rows are not reused.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::LedgerError;
use super::models::{
    Account, CreateAccountParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, Transfer,
};
use super::store::{LedgerStore, UnitOfWork};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
}

impl Tables {
    fn account(&self, account_id: i64) -> Result<&Account, LedgerError> {
        self.accounts
            .get(&account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }
}

struct Shared {
    tables: RwLock<Tables>,
    row_locks: DashMap<i64, Arc<Mutex<()>>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
    lock_timeout: Duration,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, LedgerError> {
        self.tables
            .read()
            .map_err(|_| LedgerError::Internal("ledger tables lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, LedgerError> {
        self.tables
            .write()
            .map_err(|_| LedgerError::Internal("ledger tables lock poisoned".to_string()))
    }

    fn ensure_account(&self, account_id: i64) -> Result<(), LedgerError> {
        self.read()?.account(account_id).map(|_| ())
    }

    fn committed_account(&self, account_id: i64) -> Result<Account, LedgerError> {
        self.read()?.account(account_id).cloned()
    }

    /// Wait for the row lock of an existing account.
    ///
    /// Lock entries are created with the account and removed with it, so a
    /// missing entry, or an account deleted while waiting, is `NotFound`.
    async fn lock_row(&self, account_id: i64) -> Result<OwnedMutexGuard<()>, LedgerError> {
        let row_lock = self
            .row_locks
            .get(&account_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerError::account_not_found(account_id))?;

        let guard = tokio::time::timeout(self.lock_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| {
                LedgerError::Conflict(format!("lock wait timeout on account {}", account_id))
            })?;

        self.ensure_account(account_id)?;
        Ok(guard)
    }
}

/// Consistent copy of all committed rows
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub accounts: Vec<Account>,
    pub entries: Vec<Entry>,
    pub transfers: Vec<Transfer>,
}

impl LedgerSnapshot {
    pub fn account(&self, account_id: i64) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == account_id)
    }

    pub fn entries_for(&self, account_id: i64) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(move |e| e.account_id == account_id)
    }
}

/// Row-locking ledger store held in process memory
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: DashMap::new(),
                account_seq: AtomicI64::new(1),
                entry_seq: AtomicI64::new(1),
                transfer_seq: AtomicI64::new(1),
                lock_timeout,
            }),
        }
    }

    pub fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        let account = Account {
            id: self.shared.account_seq.fetch_add(1, Ordering::SeqCst),
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };

        self.shared
            .write()?
            .accounts
            .insert(account.id, account.clone());
        self.shared.row_locks.insert(account.id, Arc::default());

        tracing::debug!(account_id = account.id, owner = %account.owner, "Account created");
        Ok(account)
    }

    pub fn get_account(&self, account_id: i64) -> Result<Account, LedgerError> {
        self.shared.committed_account(account_id)
    }

    pub fn list_accounts(&self, params: &ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        let tables = self.shared.read()?;
        Ok(tables
            .accounts
            .values()
            .filter(|a| a.owner == params.owner)
            .skip(params.offset.max(0) as usize)
            .take(params.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    /// Overwrite a balance. Waits for the row lock like any other writer.
    pub async fn update_account_balance(
        &self,
        account_id: i64,
        balance: i64,
    ) -> Result<Account, LedgerError> {
        self.shared.ensure_account(account_id)?;
        let _row = self.shared.lock_row(account_id).await?;

        let mut tables = self.shared.write()?;
        let account = tables
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))?;
        account.balance = balance;
        Ok(account.clone())
    }

    /// Delete an account that has no ledger history.
    pub async fn delete_account(&self, account_id: i64) -> Result<(), LedgerError> {
        self.shared.ensure_account(account_id)?;
        let _row = self.shared.lock_row(account_id).await?;

        let mut tables = self.shared.write()?;
        if tables.entries.values().any(|e| e.account_id == account_id) {
            return Err(LedgerError::InvalidArgument(format!(
                "account {} has ledger entries",
                account_id
            )));
        }
        tables
            .accounts
            .remove(&account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))?;
        drop(tables);

        // Still under `_row`: waiters holding the old lock re-check and fail.
        self.shared.row_locks.remove(&account_id);
        tracing::debug!(account_id, "Account deleted");
        Ok(())
    }

    pub fn get_entry(&self, entry_id: i64) -> Result<Entry, LedgerError> {
        self.shared
            .read()?
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("entry {}", entry_id)))
    }

    pub fn list_entries(&self, params: &ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let tables = self.shared.read()?;
        Ok(tables
            .entries
            .values()
            .filter(|e| e.account_id == params.account_id)
            .skip(params.offset.max(0) as usize)
            .take(params.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    pub fn get_transfer(&self, transfer_id: i64) -> Result<Transfer, LedgerError> {
        self.shared
            .read()?
            .transfers
            .get(&transfer_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("transfer {}", transfer_id)))
    }

    /// Transfers leaving `from_account_id` or arriving at `to_account_id`
    pub fn list_transfers(
        &self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let tables = self.shared.read()?;
        Ok(tables
            .transfers
            .values()
            .filter(|t| {
                t.from_account_id == params.from_account_id
                    || t.to_account_id == params.to_account_id
            })
            .skip(params.offset.max(0) as usize)
            .take(params.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        let tables = self.shared.read()?;
        Ok(LedgerSnapshot {
            accounts: tables.accounts.values().cloned().collect(),
            entries: tables.entries.values().cloned().collect(),
            transfers: tables.transfers.values().cloned().collect(),
        })
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, LedgerError> {
        Ok(MemoryUnitOfWork {
            shared: self.shared.clone(),
            row_locks: BTreeMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
            deltas: BTreeMap::new(),
        })
    }
}

/// Open in-memory unit of work.
///
/// Row locks live in `row_locks` and are released when this value is
/// consumed by `commit`/`abort` or dropped.
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    row_locks: BTreeMap<i64, OwnedMutexGuard<()>>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
    deltas: BTreeMap<i64, i64>,
}

impl MemoryUnitOfWork {
    /// Committed row plus this unit of work's own pending delta
    fn visible_account(&self, account_id: i64) -> Result<Account, LedgerError> {
        let mut account = self.shared.committed_account(account_id)?;
        if let Some(delta) = self.deltas.get(&account_id) {
            account.balance = account
                .balance
                .checked_add(*delta)
                .ok_or_else(|| balance_overflow(account_id))?;
        }
        Ok(account)
    }
}

fn balance_overflow(account_id: i64) -> LedgerError {
    LedgerError::Internal(format!("balance overflow on account {}", account_id))
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        self.shared.ensure_account(from_account_id)?;
        self.shared.ensure_account(to_account_id)?;

        let transfer = Transfer {
            id: self.shared.transfer_seq.fetch_add(1, Ordering::SeqCst),
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn insert_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, LedgerError> {
        self.shared.ensure_account(account_id)?;

        let entry = Entry {
            id: self.shared.entry_seq.fetch_add(1, Ordering::SeqCst),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn adjust_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, LedgerError> {
        self.shared.ensure_account(account_id)?;
        if !self.row_locks.contains_key(&account_id) {
            let guard = self.shared.lock_row(account_id).await?;
            self.row_locks.insert(account_id, guard);
        }

        let pending = self.deltas.get(&account_id).copied().unwrap_or(0);
        let pending = pending
            .checked_add(delta)
            .ok_or_else(|| balance_overflow(account_id))?;
        self.deltas.insert(account_id, pending);

        self.visible_account(account_id)
    }

    async fn get_account(&mut self, account_id: i64) -> Result<Account, LedgerError> {
        self.visible_account(account_id)
    }

    async fn commit(self) -> Result<(), LedgerError> {
        {
            let mut tables = self.shared.write()?;

            // Referenced rows must still exist; nothing is applied otherwise.
            let referenced = self
                .transfers
                .iter()
                .flat_map(|t| [t.from_account_id, t.to_account_id])
                .chain(self.entries.iter().map(|e| e.account_id))
                .chain(self.deltas.keys().copied());
            for account_id in referenced {
                tables.account(account_id)?;
            }

            let mut balances = Vec::with_capacity(self.deltas.len());
            for (&account_id, &delta) in &self.deltas {
                let balance = tables
                    .account(account_id)?
                    .balance
                    .checked_add(delta)
                    .ok_or_else(|| balance_overflow(account_id))?;
                balances.push((account_id, balance));
            }

            for (account_id, balance) in balances {
                if let Some(account) = tables.accounts.get_mut(&account_id) {
                    account.balance = balance;
                }
            }
            for transfer in &self.transfers {
                tables.transfers.insert(transfer.id, transfer.clone());
            }
            for entry in &self.entries {
                tables.entries.insert(entry.id, entry.clone());
            }
        }

        tracing::debug!(
            transfers = self.transfers.len(),
            entries = self.entries.len(),
            locked_rows = self.row_locks.len(),
            "Unit of work committed"
        );
        Ok(())
    }

    async fn abort(self) -> Result<(), LedgerError> {
        tracing::debug!(
            discarded_transfers = self.transfers.len(),
            discarded_entries = self.entries.len(),
            "Unit of work aborted"
        );
        Ok(())
    }
}
