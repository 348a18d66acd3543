//! Usage aggregation into charge records.
//!
//! Storage and object counts are integrated with a step rule: each occupancy
//! sample's value is held until the next sample supersedes it, so a window
//! contributes `value_i * hours(t_{i+1} - t_i)`. The last sample in the period
//! contributes nothing, and fewer than two samples yield zero.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_billing_core::{
    BillingPeriod, EgressSettlement, OccupancySample, Project, ProjectChargeRecord, ProjectId,
};
use tally_billing_store::Store;

use crate::collaborators::MeteringSource;
use crate::error::{ReconcileError, Result, Stage, StoreResultExt};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Integrated occupancy of one project over one period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Occupancy {
    /// Storage in byte-hours.
    pub byte_hours: f64,
    /// Objects in object-hours.
    pub object_hours: f64,
}

/// Integrate a project's occupancy samples over `period`.
///
/// Samples outside `[start, end)` are ignored.
///
/// # Errors
///
/// Returns an integrity error if a sample belongs to another project.
#[allow(clippy::cast_precision_loss)]
pub fn integrate_occupancy(
    project_id: &ProjectId,
    period: &BillingPeriod,
    samples: &[OccupancySample],
) -> Result<Occupancy> {
    let mut inside = Vec::with_capacity(samples.len());
    for sample in samples {
        if sample.project_id != *project_id {
            return Err(foreign(project_id, &sample.project_id, "occupancy sample"));
        }
        if period.contains(sample.timestamp) {
            inside.push(sample);
        }
    }
    inside.sort_by_key(|s| s.timestamp);

    let mut occupancy = Occupancy::default();
    for window in inside.windows(2) {
        let hours = hours_between(window[0].timestamp, window[1].timestamp);
        occupancy.byte_hours += window[0].bytes as f64 * hours;
        occupancy.object_hours += window[0].object_count as f64 * hours;
    }
    Ok(occupancy)
}

/// Sum a project's settled egress inside `period`.
///
/// # Errors
///
/// Returns an integrity error if a settlement belongs to another project.
pub fn sum_egress(
    project_id: &ProjectId,
    period: &BillingPeriod,
    settlements: &[EgressSettlement],
) -> Result<u64> {
    let mut total: u64 = 0;
    for settlement in settlements {
        if settlement.project_id != *project_id {
            return Err(foreign(project_id, &settlement.project_id, "egress settlement"));
        }
        if period.contains(settlement.settled_at) {
            total = total.saturating_add(settlement.bytes);
        }
    }
    Ok(total)
}

#[allow(clippy::cast_precision_loss)]
fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

fn foreign(expected: &ProjectId, found: &ProjectId, what: &str) -> ReconcileError {
    ReconcileError::integrity(
        Stage::Aggregate,
        format!("{what} for project {found} returned while aggregating project {expected}"),
    )
}

/// Turns metering data into charge records.
pub struct UsageAggregator {
    store: Arc<dyn Store>,
    metering: Arc<dyn MeteringSource>,
}

impl UsageAggregator {
    /// Create an aggregator.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, metering: Arc<dyn MeteringSource>) -> Self {
        Self { store, metering }
    }

    /// Prepare the charge records of one page of projects.
    ///
    /// Projects that already have a record for `period` are skipped. The page's
    /// new records are written in one atomic batch. Returns the number created.
    ///
    /// # Errors
    ///
    /// Returns an error if metering or the store fails, or if metering data
    /// is inconsistent. Nothing of the page is written then.
    pub async fn prepare_page(
        &self,
        period: &BillingPeriod,
        projects: &[Project],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut records = Vec::with_capacity(projects.len());

        for project in projects {
            if self
                .store
                .get_charge_record(&project.id, period)
                .at(Stage::Aggregate)?
                .is_some()
            {
                continue;
            }
            records.push(self.aggregate(project, period, now).await?);
        }

        if records.is_empty() {
            return Ok(0);
        }
        self.store
            .insert_charge_records(&records)
            .at(Stage::Aggregate)
    }

    async fn aggregate(
        &self,
        project: &Project,
        period: &BillingPeriod,
        now: DateTime<Utc>,
    ) -> Result<ProjectChargeRecord> {
        let settlements = self
            .metering
            .egress_settlements(&project.id, period)
            .await
            .map_err(|source| ReconcileError::Metering {
                stage: Stage::Aggregate,
                source,
            })?;
        let samples = self
            .metering
            .occupancy_samples(&project.id, period)
            .await
            .map_err(|source| ReconcileError::Metering {
                stage: Stage::Aggregate,
                source,
            })?;

        let egress = sum_egress(&project.id, period, &settlements)?;
        let occupancy = integrate_occupancy(&project.id, period, &samples)?;

        tracing::debug!(
            project_id = %project.id,
            period = %period,
            egress_bytes = egress,
            byte_hours = occupancy.byte_hours,
            "Aggregated project usage"
        );

        Ok(ProjectChargeRecord::new(
            project,
            *period,
            egress,
            occupancy.byte_hours,
            occupancy.object_hours,
            now,
        ))
    }
}
