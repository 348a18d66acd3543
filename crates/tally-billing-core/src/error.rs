//! Error types for tally-billing.

use crate::ids::IdError;

/// Result type for tally-billing core operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur while building billing values.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The requested billing period does not exist.
    #[error("invalid billing period: {year}-{month:02}")]
    InvalidPeriod {
        /// Calendar year.
        year: i32,
        /// Calendar month (1-12 when valid).
        month: u32,
    },

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
