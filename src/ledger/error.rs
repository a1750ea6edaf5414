//! Ledger Error Types
//!
//! Every store failure is classified into one of four kinds so callers can
//! decide between "fix the request", "reissue later" and "give up".

use thiserror::Error;

/// PostgreSQL SQLSTATE codes that mean "the store could not serialize this
/// unit of work". The whole transfer may be reissued as a new call.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";

/// Referenced row is missing (`accounts.id` for transfers and entries).
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Rejected before any store interaction
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization failure, deadlock, lock wait timeout or cancellation
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable error code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether reissuing the same request as a brand-new call may succeed.
    ///
    /// `NotFound` and `InvalidArgument` are permanent for the given inputs;
    /// `Internal` carries no retry guidance.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }

    pub fn account_not_found(account_id: i64) -> Self {
        LedgerError::NotFound(format!("account {}", account_id))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound(e.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SERIALIZATION_FAILURE)
                | Some(DEADLOCK_DETECTED)
                | Some(LOCK_NOT_AVAILABLE)
                | Some(QUERY_CANCELED) => LedgerError::Conflict(db_err.message().to_string()),
                Some(FOREIGN_KEY_VIOLATION) => LedgerError::NotFound(db_err.message().to_string()),
                _ => LedgerError::Internal(e.to_string()),
            },
            _ => LedgerError::Internal(e.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for LedgerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        LedgerError::Conflict("unit of work timed out before commit".to_string())
    }
}
