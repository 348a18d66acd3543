//! Pipeline orchestration.
//!
//! A period is reconciled by calling, in order:
//!
//! 1. [`Reconciler::prepare_charge_records`]
//! 2. [`Reconciler::post_charge_records`]
//! 3. [`Reconciler::apply_coupons`]
//! 4. [`Reconciler::apply_credits`]
//! 5. [`Reconciler::finalize_invoices`]
//! 6. [`Reconciler::expire_coupons`]
//!
//! or [`Reconciler::run`], which does exactly that. Every operation only acts on
//! unapplied records and may be called again after a failure. The reconciler
//! does not lock a period: callers must not run two pipelines for the same
//! period at once.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_billing_core::{AllowanceKind, BillingPeriod, Page, Project, UserId};
use tally_billing_store::{RecordFilter, Store, StoreError, UsageFilter};

use crate::aggregator::UsageAggregator;
use crate::clock::Clock;
use crate::collaborators::{InvoiceSink, MeteringSource};
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, Result, Stage, StoreResultExt};
use crate::finalizer::{FinalizeReport, InvoiceFinalizer};
use crate::ledger::{AllocationSummary, AllowanceLedger};
use crate::pagination::{CancelSignal, Paginator};
use crate::policy::WelcomePolicy;
use crate::posting::PostingStage;

/// Outcome of [`Reconciler::prepare_charge_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareSummary {
    /// Projects listed by metering.
    pub projects: usize,
    /// Charge records created by this call.
    pub records_created: usize,
    /// Welcome coupons granted by this call.
    pub welcome_coupons: usize,
    /// Coupon allocation.
    pub coupons: AllocationSummary,
    /// Credit allocation.
    pub credits: AllocationSummary,
}

/// Outcome of [`Reconciler::apply_coupons`] and [`Reconciler::apply_credits`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Allocation performed by this call (non-zero only for late allowances).
    pub allocated: AllocationSummary,
    /// Usages posted.
    pub posted: usize,
}

/// Outcome of [`Reconciler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Preparation.
    pub prepared: PrepareSummary,
    /// Charge records posted.
    pub charges_posted: usize,
    /// Coupon stage.
    pub coupons: ApplySummary,
    /// Credit stage.
    pub credits: ApplySummary,
    /// Invoice submission.
    pub invoices: FinalizeReport,
    /// Coupons that expired at the end of the period.
    pub coupons_expired: usize,
}

/// Records of a period that are still unapplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    /// Unapplied charge records.
    pub charge_records: usize,
    /// Unapplied coupon usages.
    pub coupon_usages: usize,
    /// Unapplied credit usages.
    pub credit_usages: usize,
}

impl PendingCounts {
    /// Whether everything has been posted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.charge_records == 0 && self.coupon_usages == 0 && self.credit_usages == 0
    }
}

/// The period reconciliation engine.
pub struct Reconciler {
    store: Arc<dyn Store>,
    metering: Arc<dyn MeteringSource>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn WelcomePolicy>,
    config: ReconcilerConfig,
    cancel: CancelSignal,
    aggregator: UsageAggregator,
    ledger: AllowanceLedger,
    posting: PostingStage,
    finalizer: InvoiceFinalizer,
}

impl Reconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        metering: Arc<dyn MeteringSource>,
        sink: Arc<dyn InvoiceSink>,
        clock: Arc<dyn Clock>,
        policy: Arc<dyn WelcomePolicy>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            aggregator: UsageAggregator::new(Arc::clone(&store), Arc::clone(&metering)),
            ledger: AllowanceLedger::new(Arc::clone(&store), config.pricing.clone()),
            posting: PostingStage::new(Arc::clone(&store)),
            finalizer: InvoiceFinalizer::new(
                Arc::clone(&store),
                sink,
                config.pricing.clone(),
                config.invoicing,
            ),
            store,
            metering,
            clock,
            policy,
            config,
            cancel: CancelSignal::new(),
        }
    }

    /// Use `signal` to cancel stages between pages.
    #[must_use]
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = signal;
        self
    }

    /// The signal that cancels running stages.
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// The most recent period that has ended.
    #[must_use]
    pub fn last_closed_period(&self) -> BillingPeriod {
        BillingPeriod::containing(self.clock.now()).previous()
    }

    fn ensure_closed(&self, period: &BillingPeriod) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        if period.is_closed_at(now) {
            Ok(now)
        } else {
            Err(ReconcileError::PeriodNotClosed {
                period: *period,
                now,
            })
        }
    }

    fn limit(&self) -> usize {
        self.config.listing_limit
    }

    /// Compute the period: charge records, welcome coupons and unapplied
    /// allowance usages (coupons first, then credits).
    ///
    /// Projects that already have a record are skipped, so calling this again
    /// only picks up what is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the period is open, a collaborator fails, data is
    /// inconsistent, or the stage is cancelled. Pages committed before the
    /// error are kept.
    pub async fn prepare_charge_records(&self, period: &BillingPeriod) -> Result<PrepareSummary> {
        let now = self.ensure_closed(period)?;
        tracing::info!(period = %period, limit = self.limit(), "Preparing charge records");

        let mut summary = PrepareSummary::default();
        let mut pages = Paginator::scan(Stage::Aggregate, self.limit(), &self.cancel);
        while let Some(offset) = pages.next_offset()? {
            let page = self
                .metering
                .list_projects(period, offset, pages.limit())
                .await
                .map_err(|source| ReconcileError::Metering {
                    stage: Stage::Aggregate,
                    source,
                })?;

            summary.projects += page.len();
            summary.welcome_coupons += self.grant_welcome_coupons(&page.items, now)?;
            summary.records_created += self.aggregator.prepare_page(period, &page.items, now).await?;
            pages.advance(&page);
        }

        tracing::info!(
            period = %period,
            projects = summary.projects,
            records = summary.records_created,
            welcome_coupons = summary.welcome_coupons,
            "Charge records prepared"
        );

        summary.coupons = self.ledger.apply_allowances(
            period,
            AllowanceKind::Coupon,
            self.limit(),
            &self.cancel,
            now,
        )?;
        summary.credits = self.ledger.apply_allowances(
            period,
            AllowanceKind::Credit,
            self.limit(),
            &self.cancel,
            now,
        )?;
        Ok(summary)
    }

    fn grant_welcome_coupons(&self, projects: &[Project], now: DateTime<Utc>) -> Result<usize> {
        let owners: HashSet<UserId> = projects.iter().map(|p| p.owner_id).collect();
        let mut granted = 0;

        for owner in owners {
            let Some(coupon) = self.policy.welcome_coupon(&owner, now) else {
                continue;
            };
            if self
                .store
                .grant_signup_coupon(&coupon)
                .at(Stage::WelcomeGrant)?
            {
                tracing::info!(user_id = %owner, amount_cents = coupon.original_cents, "Granted welcome coupon");
                granted += 1;
            }
        }
        Ok(granted)
    }

    /// Post the period's charge records.
    ///
    /// # Errors
    ///
    /// Returns an error if the period is open, the store fails, or the stage is
    /// cancelled.
    pub fn post_charge_records(&self, period: &BillingPeriod) -> Result<usize> {
        self.ensure_closed(period)?;
        self.posting
            .post_charge_records(period, self.limit(), &self.cancel)
    }

    /// Post the period's coupon usages.
    ///
    /// Coupons granted after preparation are allocated first. Coupon
    /// durations are left alone; see [`Reconciler::expire_coupons`].
    ///
    /// # Errors
    ///
    /// Returns an error if the period is open, the store fails, a usage has
    /// lost its coupon, or the stage is cancelled.
    pub fn apply_coupons(&self, period: &BillingPeriod) -> Result<ApplySummary> {
        let now = self.ensure_closed(period)?;
        let allocated = self.ledger.apply_allowances(
            period,
            AllowanceKind::Coupon,
            self.limit(),
            &self.cancel,
            now,
        )?;
        let posted = self.posting.post_allowance_usages(
            period,
            AllowanceKind::Coupon,
            self.limit(),
            &self.cancel,
        )?;

        Ok(ApplySummary { allocated, posted })
    }

    /// Post the period's credit usages.
    ///
    /// Credits purchased after preparation are allocated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the period is open, the store fails, a usage has
    /// lost its credit, or the stage is cancelled.
    pub fn apply_credits(&self, period: &BillingPeriod) -> Result<ApplySummary> {
        let now = self.ensure_closed(period)?;
        let allocated = self.ledger.apply_allowances(
            period,
            AllowanceKind::Credit,
            self.limit(),
            &self.cancel,
            now,
        )?;
        let posted = self.posting.post_allowance_usages(
            period,
            AllowanceKind::Credit,
            self.limit(),
            &self.cancel,
        )?;

        Ok(ApplySummary { allocated, posted })
    }

    /// Close `period` for coupons: every active coupon that existed during it
    /// loses one period of duration, and coupons reaching zero expire.
    ///
    /// Returns the number of coupons that expired. Calling this again for the
    /// same period changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the period is open, the store fails, or the stage is
    /// cancelled.
    pub fn expire_coupons(&self, period: &BillingPeriod) -> Result<usize> {
        self.ensure_closed(period)?;
        self.ledger
            .expire_coupons(period, self.limit(), &self.cancel)
    }

    /// Submit one invoice per user with applied records in the period.
    ///
    /// # Errors
    ///
    /// Returns an error if the period is open, the store fails, or the stage is
    /// cancelled. Provider failures are listed in the report.
    pub async fn finalize_invoices(&self, period: &BillingPeriod) -> Result<FinalizeReport> {
        self.ensure_closed(period)?;
        self.finalizer
            .finalize(period, self.limit(), &self.cancel)
            .await
    }

    /// Submit the invoice of one user again.
    ///
    /// # Errors
    ///
    /// Returns an error if the period is open or the store fails.
    pub async fn finalize_user(
        &self,
        user_id: &UserId,
        period: &BillingPeriod,
    ) -> Result<FinalizeReport> {
        self.ensure_closed(period)?;
        self.finalizer.finalize_user(user_id, period).await
    }

    /// Run every stage for the period in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing stage and returns its error; earlier stages
    /// stay committed.
    pub async fn run(&self, period: &BillingPeriod) -> Result<RunSummary> {
        let prepared = self.prepare_charge_records(period).await?;
        let charges_posted = self.post_charge_records(period)?;
        let coupons = self.apply_coupons(period)?;
        let credits = self.apply_credits(period)?;
        let invoices = self.finalize_invoices(period).await?;
        let coupons_expired = self.expire_coupons(period)?;

        tracing::info!(
            period = %period,
            records = prepared.records_created,
            charges_posted,
            coupon_usages = coupons.posted,
            credit_usages = credits.posted,
            invoices = invoices.submitted.len(),
            failed = invoices.failed.len(),
            coupons_expired,
            "Period reconciled"
        );

        Ok(RunSummary {
            prepared,
            charges_posted,
            coupons,
            credits,
            invoices,
            coupons_expired,
        })
    }

    /// Count the period's records that are still unapplied.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn pending(&self, period: &BillingPeriod) -> Result<PendingCounts> {
        let charges = RecordFilter::unapplied(*period);
        let coupons = UsageFilter::unapplied(*period, AllowanceKind::Coupon);
        let credits = UsageFilter::unapplied(*period, AllowanceKind::Credit);

        Ok(PendingCounts {
            charge_records: self.count(|offset, limit| {
                self.store.list_charge_records(&charges, offset, limit)
            })?,
            coupon_usages: self.count(|offset, limit| {
                self.store.list_allowance_usages(&coupons, offset, limit)
            })?,
            credit_usages: self.count(|offset, limit| {
                self.store.list_allowance_usages(&credits, offset, limit)
            })?,
        })
    }

    fn count<T, F>(&self, mut fetch: F) -> Result<usize>
    where
        F: FnMut(usize, usize) -> std::result::Result<Page<T>, StoreError>,
    {
        let mut pages = Paginator::scan(Stage::Inspect, self.limit(), &CancelSignal::new());
        let mut total = 0;
        while let Some(offset) = pages.next_offset()? {
            let page = fetch(offset, pages.limit()).at(Stage::Inspect)?;
            total += page.len();
            pages.advance(&page);
        }
        Ok(total)
    }
}
