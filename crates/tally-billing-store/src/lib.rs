//! `RocksDB` storage layer for tally-billing.
//!
//! This crate persists charge records, allowances and allowance usages, and is
//! the boundary where the reconciliation invariants are enforced:
//!
//! - record creation is existence-checked atomically with the write, so at most
//!   one charge record exists per (project, period) and at most one usage per
//!   (allowance, period);
//! - status changes are conditional updates that only move `unapplied` to
//!   `applied`;
//! - a usage is written in the same batch as the balance decrement of its
//!   allowance, so `remaining + Σ usages == original` holds after every write.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `charge_records`: keyed by `period || project_id`
//! - `charge_records_by_user`: index for a user's records in a period
//! - `allowances`: coupons and credits, keyed by `allowance_id`
//! - `allowances_by_kind` / `allowances_by_user`: listing indexes
//! - `allowance_usages`: keyed by `period || allowance_id`
//! - `usages_by_user`: index for a user's usages in a period
//! - `signup_grants`: one marker per user that received a welcome coupon
//!
//! # Example
//!
//! ```no_run
//! use tally_billing_store::{RocksStore, Store};
//! use tally_billing_core::{Allowance, UserId};
//!
//! let store = RocksStore::open("/tmp/tally-billing-db").unwrap();
//!
//! let credit = Allowance::credit(UserId::generate(), 900, "tx-1", chrono::Utc::now()).unwrap();
//! store.insert_allowance(&credit).unwrap();
//!
//! let retrieved = store.get_allowance(&credit.id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use tally_billing_core::{
    Allowance, AllowanceId, AllowanceKind, AllowanceUsage, BillingPeriod, Page, ProjectChargeRecord,
    ProjectId, RecordStatus, UserId,
};

/// Filter for listing charge records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFilter {
    /// Period whose records are listed.
    pub period: BillingPeriod,
    /// Only records in this status; `None` lists all.
    pub status: Option<RecordStatus>,
}

impl RecordFilter {
    /// Unapplied records of a period.
    #[must_use]
    pub const fn unapplied(period: BillingPeriod) -> Self {
        Self {
            period,
            status: Some(RecordStatus::Unapplied),
        }
    }

    /// Applied records of a period.
    #[must_use]
    pub const fn applied(period: BillingPeriod) -> Self {
        Self {
            period,
            status: Some(RecordStatus::Applied),
        }
    }

    /// Every record of a period.
    #[must_use]
    pub const fn all(period: BillingPeriod) -> Self {
        Self {
            period,
            status: None,
        }
    }
}

/// Filter for listing allowance usages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageFilter {
    /// Period whose usages are listed.
    pub period: BillingPeriod,
    /// Only usages of this allowance kind; `None` lists both.
    pub kind: Option<AllowanceKind>,
    /// Only usages in this status; `None` lists all.
    pub status: Option<RecordStatus>,
}

impl UsageFilter {
    /// Unapplied usages of one kind.
    #[must_use]
    pub const fn unapplied(period: BillingPeriod, kind: AllowanceKind) -> Self {
        Self {
            period,
            kind: Some(kind),
            status: Some(RecordStatus::Unapplied),
        }
    }

    /// Applied usages of both kinds.
    #[must_use]
    pub const fn applied(period: BillingPeriod) -> Self {
        Self {
            period,
            kind: None,
            status: Some(RecordStatus::Applied),
        }
    }
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing). Listing operations return one page
/// at a time and never materialize a full result set.
pub trait Store: Send + Sync {
    // =========================================================================
    // Charge Records
    // =========================================================================

    /// Insert charge records in one atomic batch, skipping any (project, period)
    /// that already has a record.
    ///
    /// Returns the number of records actually inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    fn insert_charge_records(&self, records: &[ProjectChargeRecord]) -> Result<usize>;

    /// Get the charge record of a project for a period.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_charge_record(
        &self,
        project_id: &ProjectId,
        period: &BillingPeriod,
    ) -> Result<Option<ProjectChargeRecord>>;

    /// List one page of charge records, ordered by project ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_charge_records(
        &self,
        filter: &RecordFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ProjectChargeRecord>>;

    /// All charge records of one user for one period.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_user_charge_records(
        &self,
        user_id: &UserId,
        period: &BillingPeriod,
    ) -> Result<Vec<ProjectChargeRecord>>;

    /// Mark charge records applied in one atomic batch.
    ///
    /// Records that are already applied are left untouched. Returns the number of
    /// records that moved from `unapplied` to `applied`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if any record does not exist.
    fn post_charge_records(&self, period: &BillingPeriod, projects: &[ProjectId]) -> Result<usize>;

    // =========================================================================
    // Allowances
    // =========================================================================

    /// Insert a new allowance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the ID is taken.
    fn insert_allowance(&self, allowance: &Allowance) -> Result<()>;

    /// Insert a signup coupon unless the user already received one.
    ///
    /// Returns `true` if the coupon was granted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn grant_signup_coupon(&self, coupon: &Allowance) -> Result<bool>;

    /// Get an allowance by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_allowance(&self, allowance_id: &AllowanceId) -> Result<Option<Allowance>>;

    /// List one page of allowances of a kind, in every status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_allowances(
        &self,
        kind: AllowanceKind,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Allowance>>;

    /// All allowances of one kind belonging to a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_user_allowances(&self, user_id: &UserId, kind: AllowanceKind)
        -> Result<Vec<Allowance>>;

    /// Cross the `period` boundary for the given coupons in one atomic batch.
    ///
    /// Each coupon's duration drops by one at most once per period; coupons
    /// reaching zero expire. Returns the number of coupons that expired.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if any allowance does not exist.
    fn advance_coupons(&self, allowances: &[AllowanceId], period: &BillingPeriod) -> Result<usize>;

    // =========================================================================
    // Allowance Usages
    // =========================================================================

    /// Record usages and draw their amounts from the allowances, atomically.
    ///
    /// Usages whose (allowance, period) already exists are skipped. Returns the
    /// number of usages written.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if an allowance does not exist.
    /// - `StoreError::AllowanceUnavailable` if an allowance cannot cover its usage.
    /// - `StoreError::Integrity` if a usage disagrees with its allowance's owner or kind.
    fn record_allowance_usages(&self, usages: &[AllowanceUsage]) -> Result<usize>;

    /// Get the usage of an allowance for a period.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_allowance_usage(
        &self,
        allowance_id: &AllowanceId,
        period: &BillingPeriod,
    ) -> Result<Option<AllowanceUsage>>;

    /// List one page of usages, ordered by allowance ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_allowance_usages(
        &self,
        filter: &UsageFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<AllowanceUsage>>;

    /// All usages (both kinds, every status) of a user for a period.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_user_allowance_usages(
        &self,
        user_id: &UserId,
        period: &BillingPeriod,
    ) -> Result<Vec<AllowanceUsage>>;

    /// Mark usages applied in one atomic batch.
    ///
    /// Returns the number of usages that moved from `unapplied` to `applied`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if a usage does not exist.
    /// - `StoreError::Integrity` if a usage's allowance is missing.
    fn post_allowance_usages(
        &self,
        period: &BillingPeriod,
        allowances: &[AllowanceId],
    ) -> Result<usize>;
}
