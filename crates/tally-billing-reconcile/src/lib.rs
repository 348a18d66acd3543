//! Period reconciliation engine for tally-billing.
//!
//! Turns a closed billing period's metering data into invoices:
//!
//! 1. **Prepare**: aggregate each project's usage into a charge record, grant
//!    welcome coupons, and allocate coupons then credits against the charges.
//! 2. **Post**: mark charge records applied.
//! 3. **Apply coupons / credits**: mark allowance usages applied.
//! 4. **Finalize**: submit one invoice per user to the payment provider.
//! 5. **Expire coupons**: every coupon alive during the period loses one
//!    period of duration.
//!
//! Every stage works page by page on unapplied records and can be re-run after
//! a failure without double counting.
//!
//! # Example
//!
//! ```ignore
//! let config = ReconcilerConfig::from_env();
//! let store = Arc::new(RocksStore::open(&config.data_dir)?);
//! let reconciler = Reconciler::new(
//!     store,
//!     metering,
//!     sink,
//!     config.clock(),
//!     config.welcome_policy(),
//!     config,
//! );
//!
//! let period = reconciler.last_closed_period();
//! let summary = reconciler.run(&period).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregator;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod ledger;
pub mod pagination;
pub mod policy;
pub mod posting;
pub mod reconciler;
pub mod stripe;

pub use aggregator::{integrate_occupancy, sum_egress, Occupancy, UsageAggregator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use collaborators::{InvoiceSink, MeteringSource, ProviderInvoiceId};
pub use config::{InvoicingConfig, ReconcilerConfig, WelcomeCouponConfig};
pub use error::{MeteringError, ProviderError, ReconcileError, Result, Stage};
pub use finalizer::{FailedInvoice, FinalizeReport, InvoiceFinalizer, SubmittedInvoice};
pub use ledger::{allocate, AllocationSummary, AllowanceLedger, Draw};
pub use pagination::{CancelSignal, Paginator};
pub use policy::{NoWelcomeCoupon, SignupCouponPolicy, WelcomePolicy};
pub use posting::PostingStage;
pub use reconciler::{ApplySummary, PendingCounts, PrepareSummary, Reconciler, RunSummary};
pub use stripe::{CustomerDirectory, StripeClient, StripeConfig, StripeError, StripeInvoiceSink};
