//! Unified error type for the loyalty ledger.
//!
//! Lookups for unknown customers are not errors: they return `Ok(None)`.
//! Everything here is recoverable; batch ingestion records these per row.

use thiserror::Error;

/// Errors raised by the ledger, its storage, and its configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage unavailable or a statement failed.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A transaction row was malformed or missing a required field.
    #[error("Invalid transaction: {message}")]
    Validation {
        /// What was wrong with the row
        message: String,
    },

    /// Amount was negative, NaN, or infinite.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Page numbers are 1-based.
    #[error("Invalid page number: {page}")]
    InvalidPage {
        /// The rejected page number
        page: u64,
    },

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// Counter did not fit the target integer type.
    #[error("Integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl Error {
    /// True for errors caused by the input row rather than the store.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidAmount { .. })
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
