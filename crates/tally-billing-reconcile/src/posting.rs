//! Posting: moving computed records from `unapplied` to `applied`.
//!
//! Each page is flipped in one conditional batch, so a crash leaves every
//! record either still unapplied (and picked up by the next run) or applied.

use std::sync::Arc;

use tally_billing_core::{AllowanceId, AllowanceKind, BillingPeriod, ProjectId};
use tally_billing_store::{RecordFilter, Store, UsageFilter};

use crate::error::{Result, Stage, StoreResultExt};
use crate::pagination::{CancelSignal, Paginator};

/// Posts charge records and allowance usages.
pub struct PostingStage {
    store: Arc<dyn Store>,
}

impl PostingStage {
    /// Create a posting stage.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Post every unapplied charge record of `period`. Returns the number posted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the stage is cancelled; pages
    /// posted before that stay posted.
    pub fn post_charge_records(
        &self,
        period: &BillingPeriod,
        limit: usize,
        cancel: &CancelSignal,
    ) -> Result<usize> {
        let filter = RecordFilter::unapplied(*period);
        let mut pages = Paginator::drain(Stage::PostCharges, limit, cancel);
        let mut posted = 0;

        while let Some(offset) = pages.next_offset()? {
            let page = self
                .store
                .list_charge_records(&filter, offset, pages.limit())
                .at(Stage::PostCharges)?;
            let projects: Vec<ProjectId> = page.items.iter().map(|r| r.project_id).collect();

            let moved = self
                .store
                .post_charge_records(period, &projects)
                .at(Stage::PostCharges)?;
            posted += moved;
            pages.drained(&page, moved)?;
        }

        tracing::info!(period = %period, posted, "Charge records posted");
        Ok(posted)
    }

    /// Post every unapplied usage of `kind` for `period`. Returns the number posted.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if a usage's allowance no longer exists, and
    /// any store error or cancellation otherwise.
    pub fn post_allowance_usages(
        &self,
        period: &BillingPeriod,
        kind: AllowanceKind,
        limit: usize,
        cancel: &CancelSignal,
    ) -> Result<usize> {
        let filter = UsageFilter::unapplied(*period, kind);
        let mut pages = Paginator::drain(Stage::PostUsages, limit, cancel);
        let mut posted = 0;

        while let Some(offset) = pages.next_offset()? {
            let page = self
                .store
                .list_allowance_usages(&filter, offset, pages.limit())
                .at(Stage::PostUsages)?;
            let allowances: Vec<AllowanceId> =
                page.items.iter().map(|u| u.allowance_id).collect();

            let moved = self
                .store
                .post_allowance_usages(period, &allowances)
                .at(Stage::PostUsages)?;
            posted += moved;
            pages.drained(&page, moved)?;
        }

        tracing::info!(period = %period, kind = %kind.as_str(), posted, "Allowance usages posted");
        Ok(posted)
    }
}
