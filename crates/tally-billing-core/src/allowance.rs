//! Prepaid allowances: coupons and credits.
//!
//! Coupons are promotional balances that forfeit whatever is left once their
//! duration runs out. Credits are purchased balances that never expire. Both are
//! drained against period charges by recording [`AllowanceUsage`] entries; the
//! remaining amount only ever decreases, and
//! `remaining_cents + Σ usage.amount_cents == original_cents` at all times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::{AllowanceId, BillingPeriod, RecordStatus, UserId};

/// The two kinds of allowance, in the order they are offset against charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceKind {
    /// Time-bounded promotional allowance.
    Coupon,

    /// Non-expiring purchased allowance.
    Credit,
}

impl AllowanceKind {
    /// Stable name for logging and line-item descriptions.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Coupon => "coupon",
            Self::Credit => "credit",
        }
    }

    /// Single-byte tag used in storage keys.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Coupon => 0,
            Self::Credit => 1,
        }
    }
}

/// Lifecycle of an allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceStatus {
    /// Has balance and can be drawn from.
    Active,

    /// Balance reached zero.
    Used,

    /// Duration ran out; any balance left was forfeited.
    Expired,
}

/// Why a coupon was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// Issued by a promotion.
    Promotional,

    /// Issued once per user as a welcome allowance.
    Signup,
}

/// Kind-specific terms of an allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AllowanceTerms {
    /// Coupon terms.
    Coupon {
        /// Why the coupon exists.
        coupon_type: CouponType,
        /// Billing periods left before the coupon is forfeited.
        duration: u32,
        /// Last period whose boundary already decremented `duration`.
        last_advanced: Option<BillingPeriod>,
    },

    /// Credit terms.
    Credit {
        /// Reference of the external payment that funded the credit.
        transaction_ref: String,
    },
}

/// A coupon or credit belonging to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allowance {
    /// Allowance identifier (creation-ordered).
    pub id: AllowanceId,

    /// Owner.
    pub user_id: UserId,

    /// Amount at creation, in cents.
    pub original_cents: i64,

    /// Amount still available, in cents.
    pub remaining_cents: i64,

    /// Lifecycle status.
    pub status: AllowanceStatus,

    /// Kind-specific terms.
    pub terms: AllowanceTerms,

    /// When the allowance was created.
    pub created_at: DateTime<Utc>,
}

impl Allowance {
    /// Create an active coupon.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` if `amount_cents` is not positive.
    pub fn coupon(
        user_id: UserId,
        amount_cents: i64,
        duration: u32,
        coupon_type: CouponType,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            user_id,
            amount_cents,
            AllowanceTerms::Coupon {
                coupon_type,
                duration,
                last_advanced: None,
            },
            created_at,
        )
    }

    /// Create an active credit funded by an external transaction.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` if `amount_cents` is not positive.
    pub fn credit(
        user_id: UserId,
        amount_cents: i64,
        transaction_ref: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            user_id,
            amount_cents,
            AllowanceTerms::Credit {
                transaction_ref: transaction_ref.into(),
            },
            created_at,
        )
    }

    fn new(
        user_id: UserId,
        amount_cents: i64,
        terms: AllowanceTerms,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if amount_cents <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "allowance amount must be positive, got {amount_cents}"
            )));
        }
        Ok(Self {
            id: AllowanceId::generate(),
            user_id,
            original_cents: amount_cents,
            remaining_cents: amount_cents,
            status: AllowanceStatus::Active,
            terms,
            created_at,
        })
    }

    /// The allowance kind.
    #[must_use]
    pub const fn kind(&self) -> AllowanceKind {
        match self.terms {
            AllowanceTerms::Coupon { .. } => AllowanceKind::Coupon,
            AllowanceTerms::Credit { .. } => AllowanceKind::Credit,
        }
    }

    /// Periods left before forfeiture; `None` means unbounded (credits).
    #[must_use]
    pub const fn remaining_duration(&self) -> Option<u32> {
        match self.terms {
            AllowanceTerms::Coupon { duration, .. } => Some(duration),
            AllowanceTerms::Credit { .. } => None,
        }
    }

    /// Coupon type, if this is a coupon.
    #[must_use]
    pub const fn coupon_type(&self) -> Option<CouponType> {
        match self.terms {
            AllowanceTerms::Coupon { coupon_type, .. } => Some(coupon_type),
            AllowanceTerms::Credit { .. } => None,
        }
    }

    /// Whether the allowance can still be drawn from.
    #[must_use]
    pub fn is_spendable(&self) -> bool {
        self.status == AllowanceStatus::Active
            && self.remaining_cents > 0
            && self.remaining_duration().map_or(true, |d| d > 0)
    }

    /// Whether the allowance counts against `period`.
    ///
    /// Allowances created after the period ended belong to later periods.
    /// Signup coupons are the exception: they are granted while a user's
    /// first period is being billed and count for that period.
    #[must_use]
    pub fn applies_to(&self, period: &BillingPeriod) -> bool {
        self.created_at < period.end() || self.coupon_type() == Some(CouponType::Signup)
    }

    /// Ordering key for consumption: soonest-to-forfeit first, then oldest.
    ///
    /// Credits sort after every coupon.
    #[must_use]
    pub fn consumption_order(&self) -> (u64, DateTime<Utc>, AllowanceId) {
        let duration = self
            .remaining_duration()
            .map_or(u64::MAX, u64::from);
        (duration, self.created_at, self.id)
    }

    /// Draw `amount_cents` from the balance, flipping to `Used` at zero.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidAmount` if the amount is not positive or
    /// exceeds the remaining balance.
    pub fn consume(&mut self, amount_cents: i64) -> Result<()> {
        if amount_cents <= 0 || amount_cents > self.remaining_cents {
            return Err(BillingError::InvalidAmount(format!(
                "cannot consume {amount_cents} from allowance {} with {} remaining",
                self.id, self.remaining_cents
            )));
        }
        self.remaining_cents -= amount_cents;
        if self.remaining_cents == 0 {
            self.status = AllowanceStatus::Used;
        }
        Ok(())
    }

    /// Cross a period boundary: decrement a coupon's duration once for `period`.
    ///
    /// A coupon reaching zero duration expires. Returns `true` if anything changed.
    /// Credits and inactive allowances are left alone.
    pub fn advance(&mut self, period: BillingPeriod) -> bool {
        if self.status != AllowanceStatus::Active {
            return false;
        }
        let AllowanceTerms::Coupon {
            duration,
            last_advanced,
            ..
        } = &mut self.terms
        else {
            return false;
        };
        if last_advanced.is_some_and(|p| p >= period) {
            return false;
        }
        *duration = duration.saturating_sub(1);
        *last_advanced = Some(period);
        if *duration == 0 {
            self.status = AllowanceStatus::Expired;
        }
        true
    }
}

/// How much of one allowance was consumed against one period.
///
/// At most one usage exists per (allowance, period).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceUsage {
    /// The consumed allowance.
    pub allowance_id: AllowanceId,

    /// Owner of the allowance.
    pub user_id: UserId,

    /// Kind of the consumed allowance.
    pub kind: AllowanceKind,

    /// The period the consumption offsets.
    pub period: BillingPeriod,

    /// Consumed amount, in cents.
    pub amount_cents: i64,

    /// Posting status.
    pub status: RecordStatus,

    /// When the usage was recorded.
    pub created_at: DateTime<Utc>,
}

impl AllowanceUsage {
    /// Create an unapplied usage of `allowance` for `period`.
    #[must_use]
    pub fn new(
        allowance: &Allowance,
        period: BillingPeriod,
        amount_cents: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            allowance_id: allowance.id,
            user_id: allowance.user_id,
            kind: allowance.kind(),
            period,
            amount_cents,
            status: RecordStatus::Unapplied,
            created_at,
        }
    }
}
