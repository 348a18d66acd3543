//! Interfaces to the systems the engine reads from and hands invoices to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tally_billing_core::{
    BillingPeriod, EgressSettlement, Invoice, OccupancySample, Page, Project, ProjectId,
};

use crate::error::{MeteringError, ProviderError};

/// Read-only access to recorded usage.
#[async_trait]
pub trait MeteringSource: Send + Sync {
    /// List one page of projects with activity or membership in `period`,
    /// in a stable order.
    async fn list_projects(
        &self,
        period: &BillingPeriod,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Project>, MeteringError>;

    /// Egress settlements of a project around `period`.
    ///
    /// Settlements outside the period are tolerated and ignored by the caller.
    async fn egress_settlements(
        &self,
        project_id: &ProjectId,
        period: &BillingPeriod,
    ) -> Result<Vec<EgressSettlement>, MeteringError>;

    /// Occupancy samples of a project around `period`, in any order.
    async fn occupancy_samples(
        &self,
        project_id: &ProjectId,
        period: &BillingPeriod,
    ) -> Result<Vec<OccupancySample>, MeteringError>;
}

/// Identifier the payment provider assigned to a submitted invoice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderInvoiceId(pub String);

impl std::fmt::Display for ProviderInvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination for finalized invoices.
///
/// Submission is at-least-once. Implementations must deduplicate on
/// `idempotency_key` so a repeated submission for the same user and period
/// does not bill twice.
#[async_trait]
pub trait InvoiceSink: Send + Sync {
    /// Submit an invoice.
    async fn submit(
        &self,
        invoice: &Invoice,
        idempotency_key: &str,
    ) -> Result<ProviderInvoiceId, ProviderError>;
}
