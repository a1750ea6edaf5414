//! Ledger module
//!
//! Accounts, entries and transfers, plus the transfer engine that moves
//! money between two accounts in one unit of work.

pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod store;

#[cfg(test)]
pub mod mock;

// Re-export commonly used types
pub use engine::TransferEngine;
pub use error::LedgerError;
pub use memory::{InMemoryLedgerStore, LedgerSnapshot};
pub use models::{
    Account, CreateAccountParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, Transfer, TransferParams, TransferResult,
};
pub use postgres::{PgLedgerStore, PgUnitOfWork};
pub use repository::{AccountRepository, EntryRepository, TransferRepository};
pub use store::{LedgerStore, UnitOfWork};
