//! Core types for tally-billing.
//!
//! This crate provides the values the reconciliation engine works on:
//!
//! - **Identifiers**: `UserId`, `ProjectId`, `AllowanceId`
//! - **Periods**: `BillingPeriod`, a half-open calendar month
//! - **Usage**: `OccupancySample`, `EgressSettlement`, `ProjectChargeRecord`
//! - **Allowances**: `Allowance` (coupons and credits), `AllowanceUsage`
//! - **Pricing**: `UsagePricing`, `ProjectCharge`
//! - **Invoices**: `Invoice`, `InvoiceBuilder`
//!
//! # Money
//!
//! All amounts are `i64` cents. Usage quantities (byte-hours, object-hours) are
//! `f64` because they come from integrating samples over time; they are only
//! converted to cents at pricing time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod allowance;
pub mod error;
pub mod ids;
pub mod invoice;
pub mod page;
pub mod period;
pub mod pricing;
pub mod usage;

pub use allowance::{
    Allowance, AllowanceKind, AllowanceStatus, AllowanceTerms, AllowanceUsage, CouponType,
};
pub use error::{BillingError, Result};
pub use ids::{AllowanceId, IdError, ProjectId, UserId};
pub use invoice::{Invoice, InvoiceBuilder, InvoiceLineItem, LineItemKind};
pub use page::Page;
pub use period::BillingPeriod;
pub use pricing::{ProjectCharge, UsagePricing};
pub use usage::{EgressSettlement, OccupancySample, Project, ProjectChargeRecord, RecordStatus};
