//! Usage pricing.
//!
//! Prices are configured per terabyte (storage per TB-month, egress per TB) and
//! per object-month, all in cents. Charges are computed in floating point and
//! truncated to whole cents.

use serde::{Deserialize, Serialize};

use crate::ProjectChargeRecord;

/// Bytes per terabyte (decimal).
pub const BYTES_PER_TB: f64 = 1e12;

/// Hours in a billing month for pricing purposes.
pub const HOURS_PER_MONTH: f64 = 720.0;

/// Default storage price: $10 per TB-month.
pub const DEFAULT_STORAGE_TB_MONTH_CENTS: f64 = 1000.0;

/// Default egress price: $45 per TB.
pub const DEFAULT_EGRESS_TB_CENTS: f64 = 4500.0;

/// Default object price: $0.0000022 per object-month.
pub const DEFAULT_OBJECT_MONTH_CENTS: f64 = 0.000_22;

/// Usage prices in cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePricing {
    /// Cents per TB-month of storage.
    pub storage_tb_month_cents: f64,

    /// Cents per TB of egress.
    pub egress_tb_cents: f64,

    /// Cents per object-month.
    pub object_month_cents: f64,
}

impl Default for UsagePricing {
    fn default() -> Self {
        Self {
            storage_tb_month_cents: DEFAULT_STORAGE_TB_MONTH_CENTS,
            egress_tb_cents: DEFAULT_EGRESS_TB_CENTS,
            object_month_cents: DEFAULT_OBJECT_MONTH_CENTS,
        }
    }
}

impl UsagePricing {
    /// Price a charge record.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn charge(&self, record: &ProjectChargeRecord) -> ProjectCharge {
        let byte_hour_cents = self.storage_tb_month_cents / BYTES_PER_TB / HOURS_PER_MONTH;
        let egress_byte_cents = self.egress_tb_cents / BYTES_PER_TB;
        let object_hour_cents = self.object_month_cents / HOURS_PER_MONTH;

        ProjectCharge {
            storage_cents: record.storage_byte_hours * byte_hour_cents,
            egress_cents: record.egress_bytes as f64 * egress_byte_cents,
            objects_cents: record.object_hours * object_hour_cents,
        }
    }

    /// Total price of a charge record in whole cents.
    #[must_use]
    pub fn total_cents(&self, record: &ProjectChargeRecord) -> i64 {
        self.charge(record).total_cents()
    }
}

/// Priced components of a charge record, in fractional cents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectCharge {
    /// Storage component.
    pub storage_cents: f64,

    /// Egress component.
    pub egress_cents: f64,

    /// Object component.
    pub objects_cents: f64,
}

impl ProjectCharge {
    /// Sum of all components, truncated to whole cents.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn total_cents(&self) -> i64 {
        let total = self.storage_cents + self.egress_cents + self.objects_cents;
        if total.is_finite() && total > 0.0 {
            total.trunc() as i64
        } else {
            0
        }
    }
}
