//! Error types for the reconciliation engine.

use std::fmt;

use chrono::{DateTime, Utc};
use tally_billing_core::{BillingPeriod, UserId};
use tally_billing_store::StoreError;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Welcome coupon grants.
    WelcomeGrant,
    /// Usage aggregation into charge records.
    Aggregate,
    /// Allocation of allowances against charges.
    Allocate,
    /// Posting of charge records.
    PostCharges,
    /// Posting of allowance usages.
    PostUsages,
    /// Coupon duration housekeeping.
    ExpireCoupons,
    /// Invoice assembly and submission.
    Finalize,
    /// Status queries.
    Inspect,
}

impl Stage {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WelcomeGrant => "welcome_grant",
            Self::Aggregate => "aggregate",
            Self::Allocate => "allocate",
            Self::PostCharges => "post_charges",
            Self::PostUsages => "post_usages",
            Self::ExpireCoupons => "expire_coupons",
            Self::Finalize => "finalize",
            Self::Inspect => "inspect",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the reconciliation stages.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The store failed; committed pages are kept and the stage can be retried.
    #[error("{stage}: store error: {source}")]
    Store {
        /// Failing stage.
        stage: Stage,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The metering source failed.
    #[error("{stage}: metering error: {source}")]
    Metering {
        /// Failing stage.
        stage: Stage,
        /// Underlying metering error.
        #[source]
        source: MeteringError,
    },

    /// Stored or reported data contradicts itself. Never retried silently.
    #[error("{stage}: integrity violation: {message}")]
    Integrity {
        /// Failing stage.
        stage: Stage,
        /// What was violated.
        message: String,
    },

    /// The stage observed the cancel signal between pages.
    #[error("{stage}: cancelled after {pages_completed} pages")]
    Cancelled {
        /// Cancelled stage.
        stage: Stage,
        /// Pages fully processed before cancellation.
        pages_completed: usize,
    },

    /// The period has not ended yet.
    #[error("period {period} is not closed at {now}")]
    PeriodNotClosed {
        /// Requested period.
        period: BillingPeriod,
        /// The clock reading.
        now: DateTime<Utc>,
    },

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ReconcileError {
    /// Wrap a store error with stage context.
    ///
    /// Missing records and integrity errors from the store are integrity
    /// violations of the pipeline; everything else stays a store error.
    #[must_use]
    pub fn from_store(stage: Stage, source: StoreError) -> Self {
        match source {
            StoreError::NotFound(message) | StoreError::Integrity(message) => {
                Self::Integrity { stage, message }
            }
            source => Self::Store { stage, source },
        }
    }

    /// Create an integrity violation.
    pub fn integrity(stage: Stage, message: impl Into<String>) -> Self {
        Self::Integrity {
            stage,
            message: message.into(),
        }
    }

    /// The stage the error was raised in, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Store { stage, .. }
            | Self::Metering { stage, .. }
            | Self::Integrity { stage, .. }
            | Self::Cancelled { stage, .. } => Some(*stage),
            Self::PeriodNotClosed { .. } | Self::Configuration(_) => None,
        }
    }

    /// Whether re-running the same stage may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.is_transient(),
            Self::Metering { .. } | Self::Cancelled { .. } => true,
            _ => false,
        }
    }
}

/// Extension for attaching a stage to store results.
pub(crate) trait StoreResultExt<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T> StoreResultExt<T> for std::result::Result<T, StoreError> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|e| ReconcileError::from_store(stage, e))
    }
}

/// Error reported by a metering source.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct MeteringError(pub String);

/// Error reported by an invoice sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not be reached or asked us to back off.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the invoice.
    #[error("provider rejected invoice: {0}")]
    Rejected(String),

    /// No provider-side customer exists for the user.
    #[error("no customer registered for user {0}")]
    UnknownCustomer(UserId),
}

impl ProviderError {
    /// Whether submitting again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
