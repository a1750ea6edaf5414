//! Simple Ledger - money transfer engine
//!
//! Moves an amount between two accounts as one atomic unit of work: a
//! transfer record, a debit entry, a credit entry and two balance
//! adjustments commit together or not at all.
//!
//! # Modules
//!
//! - [`ledger`] - Models, store seam, transfer engine and repositories
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;

// Convenient re-exports at crate root
pub use config::{AppConfig, DatabaseConfig, EngineConfig};
pub use db::Database;
pub use ledger::{
    Account, Entry, InMemoryLedgerStore, LedgerError, LedgerStore, PgLedgerStore, Transfer,
    TransferEngine, TransferParams, TransferResult, UnitOfWork,
};
