//! Usage facts and per-project charge records.
//!
//! Occupancy samples and egress settlements are recorded by the metering
//! subsystem and are read-only here. A [`ProjectChargeRecord`] is the integrated
//! result for one project over one billing period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BillingPeriod, ProjectId, UserId};

/// A project as seen by the billing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier.
    pub id: ProjectId,

    /// The user that owns the project and pays for it.
    pub owner_id: UserId,

    /// When the project was created.
    pub created_at: DateTime<Utc>,
}

/// Point-in-time storage occupancy of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySample {
    /// The measured project.
    pub project_id: ProjectId,

    /// Bytes stored at `timestamp`.
    pub bytes: u64,

    /// Objects stored at `timestamp`.
    pub object_count: u64,

    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

/// A settled egress amount for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressSettlement {
    /// The project that served the traffic.
    pub project_id: ProjectId,

    /// Settled bytes.
    pub bytes: u64,

    /// When the settlement was recorded.
    pub settled_at: DateTime<Utc>,
}

/// Lifecycle of a computed record.
///
/// The only legal transition is `Unapplied -> Applied`. Applied records are
/// write-once history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Computed but not yet posted; may be reprocessed.
    Unapplied,

    /// Posted; immutable and eligible for invoicing.
    Applied,
}

impl RecordStatus {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Unapplied, Self::Applied))
    }
}

/// Integrated usage of one project for one billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectChargeRecord {
    /// The charged project.
    pub project_id: ProjectId,

    /// The project owner at the time the record was prepared.
    pub user_id: UserId,

    /// The billing period.
    pub period: BillingPeriod,

    /// Settled egress bytes.
    pub egress_bytes: u64,

    /// Integrated storage, in byte-hours.
    pub storage_byte_hours: f64,

    /// Integrated object count, in object-hours.
    pub object_hours: f64,

    /// Posting status.
    pub status: RecordStatus,

    /// When the record was prepared.
    pub created_at: DateTime<Utc>,
}

impl ProjectChargeRecord {
    /// Create a new unapplied record.
    #[must_use]
    pub fn new(
        project: &Project,
        period: BillingPeriod,
        egress_bytes: u64,
        storage_byte_hours: f64,
        object_hours: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id: project.id,
            user_id: project.owner_id,
            period,
            egress_bytes,
            storage_byte_hours,
            object_hours,
            status: RecordStatus::Unapplied,
            created_at,
        }
    }

    /// Whether the record has been posted.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.status == RecordStatus::Applied
    }
}
