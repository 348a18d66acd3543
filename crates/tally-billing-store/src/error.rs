//! Error types for tally-billing storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Record already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The allowance cannot cover the requested amount.
    #[error("allowance {allowance_id} unavailable: remaining={remaining}, requested={requested}")]
    AllowanceUnavailable {
        /// The allowance that was drawn from.
        allowance_id: String,
        /// Remaining balance in cents.
        remaining: i64,
        /// Requested amount in cents.
        requested: i64,
    },

    /// Stored data contradicts itself.
    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
