//! Finalized per-user invoices.
//!
//! The engine builds an invoice, hands it to a payment provider and keeps
//! nothing afterwards; the provider is the system of record.

use serde::{Deserialize, Serialize};

use crate::{AllowanceKind, BillingPeriod, ProjectCharge, ProjectId, UserId};

/// What an invoice line item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum LineItemKind {
    /// Usage charge of a project.
    ProjectUsage(ProjectId),

    /// Offset drawn from allowances of one kind.
    Offset(AllowanceKind),
}

/// One line of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    /// Human-readable description.
    pub description: String,

    /// Amount in cents; offsets are negative.
    pub amount_cents: i64,

    /// What the line represents.
    pub kind: LineItemKind,
}

/// Net amount owed by one user for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Billed user.
    pub user_id: UserId,

    /// Billed period.
    pub period: BillingPeriod,

    /// Line items (charges first, then offsets).
    pub line_items: Vec<InvoiceLineItem>,

    /// Sum of applied charges.
    pub charges_cents: i64,

    /// Sum of applied offsets actually deducted (never more than the charges).
    pub offsets_cents: i64,

    /// `charges_cents - offsets_cents`, never negative.
    pub net_cents: i64,
}

/// Builds an [`Invoice`] from applied charges and offsets.
#[derive(Debug)]
pub struct InvoiceBuilder {
    user_id: UserId,
    period: BillingPeriod,
    charges: Vec<InvoiceLineItem>,
    coupon_cents: i64,
    credit_cents: i64,
}

impl InvoiceBuilder {
    /// Start an empty invoice.
    #[must_use]
    pub fn new(user_id: UserId, period: BillingPeriod) -> Self {
        Self {
            user_id,
            period,
            charges: Vec::new(),
            coupon_cents: 0,
            credit_cents: 0,
        }
    }

    /// Add the priced usage of one project.
    pub fn add_charge(&mut self, project_id: ProjectId, charge: &ProjectCharge) {
        self.charges.push(InvoiceLineItem {
            description: format!("Project {project_id} usage for {}", self.period),
            amount_cents: charge.total_cents(),
            kind: LineItemKind::ProjectUsage(project_id),
        });
    }

    /// Add an applied allowance usage.
    pub fn add_offset(&mut self, kind: AllowanceKind, amount_cents: i64) {
        match kind {
            AllowanceKind::Coupon => self.coupon_cents += amount_cents,
            AllowanceKind::Credit => self.credit_cents += amount_cents,
        }
    }

    /// Finish the invoice, capping offsets so the net amount is never negative.
    #[must_use]
    pub fn build(self) -> Invoice {
        let charges_cents: i64 = self.charges.iter().map(|l| l.amount_cents).sum();
        let mut line_items = self.charges;
        let mut left = charges_cents;

        for (kind, amount) in [
            (AllowanceKind::Coupon, self.coupon_cents),
            (AllowanceKind::Credit, self.credit_cents),
        ] {
            let deducted = amount.min(left).max(0);
            if deducted == 0 {
                continue;
            }
            left -= deducted;
            line_items.push(InvoiceLineItem {
                description: format!("Discount from {}s for {}", kind.as_str(), self.period),
                amount_cents: -deducted,
                kind: LineItemKind::Offset(kind),
            });
        }

        Invoice {
            user_id: self.user_id,
            period: self.period,
            line_items,
            charges_cents,
            offsets_cents: charges_cents - left,
            net_cents: left,
        }
    }
}

impl Invoice {
    /// Idempotency key for submitting this invoice to a provider.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.user_id, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge(cents: f64) -> ProjectCharge {
        ProjectCharge {
            storage_cents: 0.0,
            egress_cents: cents,
            objects_cents: 0.0,
        }
    }

    #[test]
    fn nets_charges_against_offsets() {
        let period = BillingPeriod::month(2020, 4).unwrap();
        let mut builder = InvoiceBuilder::new(UserId::generate(), period);
        builder.add_charge(ProjectId::generate(), &charge(48.3));
        builder.add_charge(ProjectId::generate(), &charge(10.0));
        builder.add_offset(AllowanceKind::Coupon, 20);
        builder.add_offset(AllowanceKind::Credit, 5);

        let invoice = builder.build();
        assert_eq!(invoice.charges_cents, 58);
        assert_eq!(invoice.offsets_cents, 25);
        assert_eq!(invoice.net_cents, 33);
        assert_eq!(invoice.line_items.len(), 4);
        assert_eq!(invoice.line_items[2].amount_cents, -20);
    }

    #[test]
    fn net_is_never_negative() {
        let period = BillingPeriod::month(2020, 4).unwrap();
        let mut builder = InvoiceBuilder::new(UserId::generate(), period);
        builder.add_charge(ProjectId::generate(), &charge(30.0));
        builder.add_offset(AllowanceKind::Coupon, 25);
        builder.add_offset(AllowanceKind::Credit, 25);

        let invoice = builder.build();
        assert_eq!(invoice.net_cents, 0);
        assert_eq!(invoice.offsets_cents, 30);
        let credit_line = invoice.line_items.last().unwrap();
        assert_eq!(credit_line.kind, LineItemKind::Offset(AllowanceKind::Credit));
        assert_eq!(credit_line.amount_cents, -5);
    }

    #[test]
    fn idempotency_key_is_user_and_period() {
        let user = UserId::generate();
        let period = BillingPeriod::month(2021, 1).unwrap();
        let invoice = InvoiceBuilder::new(user, period).build();
        assert_eq!(invoice.idempotency_key(), format!("{user}:2021-01"));
        assert_eq!(invoice.net_cents, 0);
    }
}
