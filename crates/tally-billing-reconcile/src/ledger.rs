//! Allowance allocation.
//!
//! For each user with charges in a period, the ledger covers the outstanding
//! charge from the user's allowances of one kind, soonest-to-forfeit first.
//! Coupons run before credits: coupons forfeit unused balance at expiry,
//! credits never do.
//!
//! The outstanding charge is the user's priced charge records for the period
//! minus every usage already recorded against it, whatever its kind or status.
//! An allowance is drawn from at most once per period, which the store
//! enforces when the usages are written. Allowances created after a period
//! ended are not drawn against it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_billing_core::{
    Allowance, AllowanceId, AllowanceKind, AllowanceStatus, AllowanceUsage, BillingPeriod,
    UsagePricing, UserId,
};
use tally_billing_store::{RecordFilter, Store};

use crate::error::{Result, Stage, StoreResultExt};
use crate::pagination::{CancelSignal, Paginator};

/// One planned draw from an allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    /// The allowance drawn from.
    pub allowance_id: AllowanceId,
    /// Amount drawn, in cents.
    pub amount_cents: i64,
}

/// Plan how `outstanding_cents` is covered by `allowances`.
///
/// Only spendable allowances that are not in `tapped` take part. They are
/// consumed in ascending remaining duration, then creation order; credits come
/// after every coupon. Each takes `min(outstanding, remaining)` until nothing
/// is outstanding.
#[must_use]
pub fn allocate(
    allowances: &[Allowance],
    outstanding_cents: i64,
    tapped: &HashSet<AllowanceId>,
) -> Vec<Draw> {
    let mut candidates: Vec<&Allowance> = allowances
        .iter()
        .filter(|a| a.is_spendable() && !tapped.contains(&a.id))
        .collect();
    candidates.sort_by_key(|a| a.consumption_order());

    let mut outstanding = outstanding_cents;
    let mut draws = Vec::new();
    for allowance in candidates {
        if outstanding <= 0 {
            break;
        }
        let amount_cents = outstanding.min(allowance.remaining_cents);
        outstanding -= amount_cents;
        draws.push(Draw {
            allowance_id: allowance.id,
            amount_cents,
        });
    }
    draws
}

/// Result of one allocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationSummary {
    /// Users whose outstanding charge was examined.
    pub users: usize,
    /// Usages written.
    pub usages: usize,
    /// Cents covered by the written usages.
    pub covered_cents: i64,
}

/// Allocates allowances against charges and maintains coupon durations.
pub struct AllowanceLedger {
    store: Arc<dyn Store>,
    pricing: UsagePricing,
}

impl AllowanceLedger {
    /// Create a ledger.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, pricing: UsagePricing) -> Self {
        Self { store, pricing }
    }

    /// Cover every user's outstanding charge for `period` with allowances of `kind`.
    ///
    /// Users are found by scanning the period's charge records; each user is
    /// handled once per pass and in its own atomic write.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the pass is cancelled. Users
    /// handled before the failure keep their usages; a re-run skips them.
    pub fn apply_allowances(
        &self,
        period: &BillingPeriod,
        kind: AllowanceKind,
        limit: usize,
        cancel: &CancelSignal,
        now: DateTime<Utc>,
    ) -> Result<AllocationSummary> {
        tracing::info!(period = %period, kind = %kind.as_str(), "Applying allowances");

        let filter = RecordFilter::all(*period);
        let mut pages = Paginator::scan(Stage::Allocate, limit, cancel);
        let mut seen = HashSet::new();
        let mut summary = AllocationSummary::default();

        while let Some(offset) = pages.next_offset()? {
            let page = self
                .store
                .list_charge_records(&filter, offset, pages.limit())
                .at(Stage::Allocate)?;

            for record in &page.items {
                if !seen.insert(record.user_id) {
                    continue;
                }
                let (usages, covered) = self.apply_for_user(&record.user_id, period, kind, now)?;
                summary.users += 1;
                summary.usages += usages;
                summary.covered_cents += covered;
            }
            pages.advance(&page);
        }

        tracing::info!(
            period = %period,
            kind = %kind.as_str(),
            users = summary.users,
            usages = summary.usages,
            covered_cents = summary.covered_cents,
            "Allowances applied"
        );
        Ok(summary)
    }

    /// Cover one user's outstanding charge. Returns (usages written, cents covered).
    fn apply_for_user(
        &self,
        user_id: &UserId,
        period: &BillingPeriod,
        kind: AllowanceKind,
        now: DateTime<Utc>,
    ) -> Result<(usize, i64)> {
        let charged: i64 = self
            .store
            .list_user_charge_records(user_id, period)
            .at(Stage::Allocate)?
            .iter()
            .map(|record| self.pricing.total_cents(record))
            .sum();

        let existing = self
            .store
            .list_user_allowance_usages(user_id, period)
            .at(Stage::Allocate)?;
        let offset: i64 = existing.iter().map(|u| u.amount_cents).sum();
        let tapped: HashSet<AllowanceId> = existing.iter().map(|u| u.allowance_id).collect();

        let outstanding = (charged - offset).max(0);
        if outstanding == 0 {
            return Ok((0, 0));
        }

        let mut allowances = self
            .store
            .list_user_allowances(user_id, kind)
            .at(Stage::Allocate)?;
        allowances.retain(|a| a.applies_to(period));
        let draws = allocate(&allowances, outstanding, &tapped);
        if draws.is_empty() {
            return Ok((0, 0));
        }

        let usages: Vec<AllowanceUsage> = draws
            .iter()
            .filter_map(|draw| {
                allowances
                    .iter()
                    .find(|a| a.id == draw.allowance_id)
                    .map(|a| AllowanceUsage::new(a, *period, draw.amount_cents, now))
            })
            .collect();
        let covered: i64 = usages.iter().map(|u| u.amount_cents).sum();
        let written = self
            .store
            .record_allowance_usages(&usages)
            .at(Stage::Allocate)?;

        tracing::debug!(
            user_id = %user_id,
            period = %period,
            outstanding,
            covered,
            "Allocated allowances"
        );
        Ok((written, covered))
    }

    /// Cross the end of `period` for every active coupon that existed during it.
    ///
    /// Each coupon's remaining duration drops by one, at most once per period;
    /// coupons reaching zero expire and forfeit their balance. Returns the
    /// number of coupons that expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the pass is cancelled. Coupons
    /// already advanced for `period` are left alone on a re-run.
    pub fn expire_coupons(
        &self,
        period: &BillingPeriod,
        limit: usize,
        cancel: &CancelSignal,
    ) -> Result<usize> {
        let mut pages = Paginator::scan(Stage::ExpireCoupons, limit, cancel);
        let mut expired = 0;

        while let Some(offset) = pages.next_offset()? {
            let page = self
                .store
                .list_allowances(AllowanceKind::Coupon, offset, pages.limit())
                .at(Stage::ExpireCoupons)?;

            let active: Vec<AllowanceId> = page
                .items
                .iter()
                .filter(|c| c.status == AllowanceStatus::Active && c.applies_to(period))
                .map(|c| c.id)
                .collect();
            if !active.is_empty() {
                expired += self
                    .store
                    .advance_coupons(&active, period)
                    .at(Stage::ExpireCoupons)?;
            }
            pages.advance(&page);
        }

        tracing::info!(period = %period, expired, "Coupon durations advanced");
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_billing_core::CouponType;

    fn coupon(user: UserId, amount: i64, duration: u32) -> Allowance {
        Allowance::coupon(user, amount, duration, CouponType::Promotional, Utc::now()).unwrap()
    }

    #[test]
    fn soonest_expiring_coupons_go_first() {
        let user = UserId::generate();
        let coupons: Vec<Allowance> = [5, 4, 3, 2].iter().map(|d| coupon(user, 24, *d)).collect();

        let draws = allocate(&coupons, 48, &HashSet::new());

        assert_eq!(
            draws,
            vec![
                Draw {
                    allowance_id: coupons[3].id,
                    amount_cents: 24
                },
                Draw {
                    allowance_id: coupons[2].id,
                    amount_cents: 24
                },
            ]
        );
    }

    #[test]
    fn credits_follow_coupons() {
        let user = UserId::generate();
        let credit = Allowance::credit(user, 100, "tx-1", Utc::now()).unwrap();
        let long_coupon = coupon(user, 10, 12);

        let draws = allocate(&[credit.clone(), long_coupon.clone()], 30, &HashSet::new());

        assert_eq!(draws[0].allowance_id, long_coupon.id);
        assert_eq!(draws[0].amount_cents, 10);
        assert_eq!(draws[1].allowance_id, credit.id);
        assert_eq!(draws[1].amount_cents, 20);
    }

    #[test]
    fn ties_break_by_creation() {
        let user = UserId::generate();
        let older = coupon(user, 10, 2);
        let mut newer = coupon(user, 10, 2);
        newer.created_at = older.created_at + chrono::Duration::seconds(1);

        let draws = allocate(&[newer, older.clone()], 5, &HashSet::new());
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].allowance_id, older.id);
    }

    #[test]
    fn tapped_and_inactive_allowances_are_skipped() {
        let user = UserId::generate();
        let tapped_coupon = coupon(user, 10, 1);
        let mut used = coupon(user, 10, 1);
        used.consume(10).unwrap();
        let fresh = coupon(user, 10, 3);

        let tapped = HashSet::from([tapped_coupon.id]);
        let draws = allocate(&[tapped_coupon, used, fresh.clone()], 50, &tapped);

        assert_eq!(
            draws,
            vec![Draw {
                allowance_id: fresh.id,
                amount_cents: 10
            }]
        );
    }

    #[test]
    fn nothing_outstanding_draws_nothing() {
        let user = UserId::generate();
        assert!(allocate(&[coupon(user, 10, 1)], 0, &HashSet::new()).is_empty());
    }
}
