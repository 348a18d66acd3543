//! Invoice finalization.
//!
//! Invoices are built only from applied charge records and applied usages, so
//! they reflect committed history. Submission failures are per user: they are
//! retried with a linear backoff, then reported, and never undo any posting.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tally_billing_core::{
    BillingPeriod, Invoice, InvoiceBuilder, ProjectChargeRecord, RecordStatus, UsagePricing,
    UserId,
};
use tally_billing_store::{RecordFilter, Store, UsageFilter};

use crate::collaborators::{InvoiceSink, ProviderInvoiceId};
use crate::config::InvoicingConfig;
use crate::error::{ProviderError, Result, Stage, StoreResultExt};
use crate::pagination::{CancelSignal, Paginator};

/// An invoice the provider accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedInvoice {
    /// Billed user.
    pub user_id: UserId,
    /// Provider-side identifier.
    pub provider_id: ProviderInvoiceId,
    /// Net amount billed, in cents.
    pub net_cents: i64,
}

/// An invoice the provider did not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedInvoice {
    /// Billed user.
    pub user_id: UserId,
    /// Last error returned.
    pub error: ProviderError,
    /// Attempts made.
    pub attempts: u32,
}

/// Outcome of a finalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Accepted invoices.
    pub submitted: Vec<SubmittedInvoice>,
    /// Rejected or undeliverable invoices.
    pub failed: Vec<FailedInvoice>,
}

impl FinalizeReport {
    /// Whether every invoice was accepted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builds invoices and hands them to the payment provider.
pub struct InvoiceFinalizer {
    store: Arc<dyn Store>,
    sink: Arc<dyn InvoiceSink>,
    pricing: UsagePricing,
    invoicing: InvoicingConfig,
}

impl InvoiceFinalizer {
    /// Create a finalizer.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn InvoiceSink>,
        pricing: UsagePricing,
        invoicing: InvoicingConfig,
    ) -> Self {
        Self {
            store,
            sink,
            pricing,
            invoicing,
        }
    }

    /// Submit one invoice per user with applied records in `period`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the pass is cancelled. Provider
    /// failures are reported in the returned `FinalizeReport` instead.
    pub async fn finalize(
        &self,
        period: &BillingPeriod,
        limit: usize,
        cancel: &CancelSignal,
    ) -> Result<FinalizeReport> {
        tracing::info!(period = %period, "Finalizing invoices");

        let mut seen = HashSet::new();
        let mut report = FinalizeReport::default();

        let charges = RecordFilter::applied(*period);
        let mut pages = Paginator::scan(Stage::Finalize, limit, cancel);
        while let Some(offset) = pages.next_offset()? {
            let page = self
                .store
                .list_charge_records(&charges, offset, pages.limit())
                .at(Stage::Finalize)?;
            let users: Vec<UserId> = page
                .items
                .iter()
                .map(|r| r.user_id)
                .filter(|u| seen.insert(*u))
                .collect();
            self.submit_users(&users, period, &mut report).await?;
            pages.advance(&page);
        }

        // Users with offsets but no charge of their own still get an invoice.
        let usages = UsageFilter::applied(*period);
        let mut pages = Paginator::scan(Stage::Finalize, limit, cancel);
        while let Some(offset) = pages.next_offset()? {
            let page = self
                .store
                .list_allowance_usages(&usages, offset, pages.limit())
                .at(Stage::Finalize)?;
            let users: Vec<UserId> = page
                .items
                .iter()
                .map(|u| u.user_id)
                .filter(|u| seen.insert(*u))
                .collect();
            self.submit_users(&users, period, &mut report).await?;
            pages.advance(&page);
        }

        tracing::info!(
            period = %period,
            submitted = report.submitted.len(),
            failed = report.failed.len(),
            "Invoices finalized"
        );
        Ok(report)
    }

    /// Build and submit the invoice of a single user.
    ///
    /// A user with nothing applied in `period` gets no invoice and an empty
    /// report.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn finalize_user(
        &self,
        user_id: &UserId,
        period: &BillingPeriod,
    ) -> Result<FinalizeReport> {
        let mut report = FinalizeReport::default();
        if !self.has_applied(user_id, period)? {
            tracing::debug!(user_id = %user_id, period = %period, "Nothing applied, no invoice");
            return Ok(report);
        }
        self.submit_users(&[*user_id], period, &mut report).await?;
        Ok(report)
    }

    fn has_applied(&self, user_id: &UserId, period: &BillingPeriod) -> Result<bool> {
        let charged = self
            .store
            .list_user_charge_records(user_id, period)
            .at(Stage::Finalize)?
            .iter()
            .any(ProjectChargeRecord::is_applied);
        if charged {
            return Ok(true);
        }
        Ok(self
            .store
            .list_user_allowance_usages(user_id, period)
            .at(Stage::Finalize)?
            .iter()
            .any(|u| u.status == RecordStatus::Applied))
    }

    /// Build a user's invoice from applied records, without submitting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn build_invoice(&self, user_id: &UserId, period: &BillingPeriod) -> Result<Invoice> {
        let mut builder = InvoiceBuilder::new(*user_id, *period);

        for record in self
            .store
            .list_user_charge_records(user_id, period)
            .at(Stage::Finalize)?
            .iter()
            .filter(|r| r.is_applied())
        {
            builder.add_charge(record.project_id, &self.pricing.charge(record));
        }

        for usage in self
            .store
            .list_user_allowance_usages(user_id, period)
            .at(Stage::Finalize)?
            .iter()
            .filter(|u| u.status == RecordStatus::Applied)
        {
            builder.add_offset(usage.kind, usage.amount_cents);
        }

        Ok(builder.build())
    }

    async fn submit_users(
        &self,
        users: &[UserId],
        period: &BillingPeriod,
        report: &mut FinalizeReport,
    ) -> Result<()> {
        if users.is_empty() {
            return Ok(());
        }
        let invoices = users
            .iter()
            .map(|user| self.build_invoice(user, period))
            .collect::<Result<Vec<_>>>()?;

        let outcomes: Vec<_> = stream::iter(invoices)
            .map(|invoice| async move {
                let (result, attempts) = self.submit_with_retry(&invoice).await;
                (invoice, result, attempts)
            })
            .buffer_unordered(self.invoicing.concurrency.max(1))
            .collect()
            .await;

        for (invoice, result, attempts) in outcomes {
            match result {
                Ok(provider_id) => {
                    tracing::info!(
                        user_id = %invoice.user_id,
                        period = %invoice.period,
                        net_cents = invoice.net_cents,
                        provider_id = %provider_id,
                        "Invoice submitted"
                    );
                    report.submitted.push(SubmittedInvoice {
                        user_id: invoice.user_id,
                        provider_id,
                        net_cents: invoice.net_cents,
                    });
                }
                Err(error) => {
                    tracing::error!(
                        user_id = %invoice.user_id,
                        period = %invoice.period,
                        attempts,
                        error = %error,
                        "Invoice submission failed"
                    );
                    report.failed.push(FailedInvoice {
                        user_id: invoice.user_id,
                        error,
                        attempts,
                    });
                }
            }
        }
        Ok(())
    }

    async fn submit_with_retry(
        &self,
        invoice: &Invoice,
    ) -> (std::result::Result<ProviderInvoiceId, ProviderError>, u32) {
        let key = invoice.idempotency_key();
        let max_attempts = self.invoicing.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.sink.submit(invoice, &key).await {
                Ok(id) => return (Ok(id), attempt),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        user_id = %invoice.user_id,
                        attempt,
                        error = %e,
                        "Invoice submission failed, retrying"
                    );
                    tokio::time::sleep(self.invoicing.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}
