//! Welcome coupon policy.

use chrono::{DateTime, Utc};
use tally_billing_core::{Allowance, CouponType, UserId};

/// Decides which coupon, if any, a user receives the first time they are billed.
///
/// The store grants at most one signup coupon per user, so a policy may
/// answer the same way every time it is asked.
pub trait WelcomePolicy: Send + Sync {
    /// The coupon to grant `user_id`, created at `now`.
    fn welcome_coupon(&self, user_id: &UserId, now: DateTime<Utc>) -> Option<Allowance>;
}

/// Grants a fixed signup coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignupCouponPolicy {
    amount_cents: i64,
    duration: u32,
}

impl SignupCouponPolicy {
    /// Grant `amount_cents` lasting `duration` periods.
    ///
    /// Returns `None` for a non-positive amount or zero duration, which
    /// disables the grant.
    #[must_use]
    pub const fn new(amount_cents: i64, duration: u32) -> Option<Self> {
        if amount_cents <= 0 || duration == 0 {
            return None;
        }
        Some(Self {
            amount_cents,
            duration,
        })
    }
}

impl WelcomePolicy for SignupCouponPolicy {
    fn welcome_coupon(&self, user_id: &UserId, now: DateTime<Utc>) -> Option<Allowance> {
        Allowance::coupon(
            *user_id,
            self.amount_cents,
            self.duration,
            CouponType::Signup,
            now,
        )
        .ok()
    }
}

/// Never grants anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWelcomeCoupon;

impl WelcomePolicy for NoWelcomeCoupon {
    fn welcome_coupon(&self, _user_id: &UserId, _now: DateTime<Utc>) -> Option<Allowance> {
        None
    }
}
