//! Unified error types for the finance tracker core.
//!
//! Store and transport failures are translated into the variants below at the
//! operation boundary, so callers never see a raw driver error. Every variant
//! leaves the ledger in its last committed state.

use sea_orm::{DbErr, RuntimeErr, sqlx::Error as SqlxError};
use std::fmt;
use thiserror::Error;

/// A single field that failed validation, with a message suitable for inline display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending input field (e.g. `"amount"`)
    pub field: &'static str,
    /// Human-readable reason
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors surfaced by the ledger, reconciliation, sync and rate subsystems.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Details about what went wrong
        message: String,
    },

    /// The referenced account does not exist for the current owner
    #[error("Account not found: {id}")]
    AccountNotFound {
        /// Account id that was looked up
        id: i64,
    },

    /// The referenced transaction does not exist for the current owner
    #[error("Transaction not found: {id}")]
    TransactionNotFound {
        /// Transaction id that was looked up
        id: i64,
    },

    /// An expense would exceed the account's available balance
    #[error("Insufficient balance: available {available:.2}, requested {requested:.2}")]
    InsufficientBalance {
        /// Balance available in the account's own currency
        available: f64,
        /// Expense amount that was requested
        requested: f64,
    },

    /// Malformed input, reported field by field; never reaches the store
    #[error("Validation failed: {}", format_field_errors(.errors))]
    Validation {
        /// Every field that failed
        errors: Vec<FieldError>,
    },

    /// The store of record could not be reached
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Details about the transport failure
        message: String,
    },

    /// The store rejected the request; terminal for that call
    #[error("Store rejected the request: {message}")]
    Store {
        /// Details about the rejection
        message: String,
    },

    /// One entry of the offline queue failed to replay
    #[error("Offline entry #{sequence} failed to replay: {reason}")]
    PartialSyncFailure {
        /// Queue sequence number of the failed entry
        sequence: u64,
        /// Why the entry was skipped
        reason: String,
    },

    /// An operation required a signed-in identity
    #[error("No user is signed in")]
    NotSignedIn,

    /// The exchange-rate source failed or returned an unusable payload
    #[error("Exchange rate source error: {message}")]
    RateSource {
        /// Details about the failure
        message: String,
    },

    /// JSON (de)serialization of persisted state failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Whether this error means the store could not be reached, so a write
    /// may be retried later from the offline queue.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// Whether `err` means the store could not be talked to, as opposed to a
/// request it received and refused.
fn is_transport_failure(err: &DbErr) -> bool {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            matches!(
                e,
                SqlxError::Io(_)
                    | SqlxError::Tls(_)
                    | SqlxError::PoolTimedOut
                    | SqlxError::PoolClosed
                    | SqlxError::WorkerCrashed
            )
        }
        _ => false,
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if is_transport_failure(&err) {
            Self::StoreUnavailable {
                message: err.to_string(),
            }
        } else {
            Self::Store {
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::RateSource {
            message: err.to_string(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
