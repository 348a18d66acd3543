//! Reconciler configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tally_billing_core::UsagePricing;

use crate::clock::{Clock, FixedClock, SystemClock};
use crate::policy::{NoWelcomeCoupon, SignupCouponPolicy, WelcomePolicy};

/// Reconciler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Page size of every listing (default: 100).
    pub listing_limit: usize,

    /// Coupon granted to users on their first billed period.
    pub welcome_coupon: WelcomeCouponConfig,

    /// Usage prices.
    pub pricing: UsagePricing,

    /// Invoice submission behavior.
    pub invoicing: InvoicingConfig,

    /// Fixed "now" for replaying past runs (default: wall clock).
    pub now_override: Option<DateTime<Utc>>,

    /// Path to `RocksDB` data directory (default: "/data/tally-billing").
    pub data_dir: String,
}

/// Welcome coupon terms. A zero amount disables the grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WelcomeCouponConfig {
    /// Coupon amount in cents (default: 5500).
    pub amount_cents: i64,

    /// Periods before the coupon expires (default: 2).
    pub duration: u32,
}

/// Invoice submission settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoicingConfig {
    /// Submission attempts per user (default: 3).
    pub attempts: u32,

    /// Delay before the second attempt; grows linearly (default: 500ms).
    pub backoff: Duration,

    /// Users submitted concurrently (default: 4).
    pub concurrency: usize,
}

impl ReconcilerConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let now_override = std::env::var("BILLING_NOW").ok().and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(now) => {
                    tracing::info!(now = %now, "Using clock override");
                    Some(now.with_timezone(&Utc))
                }
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Ignoring invalid BILLING_NOW");
                    None
                }
            }
        });

        Self {
            listing_limit: env_or("BILLING_LISTING_LIMIT", defaults.listing_limit),
            welcome_coupon: WelcomeCouponConfig {
                amount_cents: env_or(
                    "BILLING_WELCOME_COUPON_CENTS",
                    defaults.welcome_coupon.amount_cents,
                ),
                duration: env_or(
                    "BILLING_WELCOME_COUPON_DURATION",
                    defaults.welcome_coupon.duration,
                ),
            },
            pricing: UsagePricing {
                storage_tb_month_cents: env_or(
                    "BILLING_STORAGE_TB_MONTH_CENTS",
                    defaults.pricing.storage_tb_month_cents,
                ),
                egress_tb_cents: env_or("BILLING_EGRESS_TB_CENTS", defaults.pricing.egress_tb_cents),
                object_month_cents: env_or(
                    "BILLING_OBJECT_MONTH_CENTS",
                    defaults.pricing.object_month_cents,
                ),
            },
            invoicing: InvoicingConfig {
                attempts: env_or("BILLING_INVOICE_ATTEMPTS", defaults.invoicing.attempts),
                backoff: Duration::from_millis(env_or("BILLING_INVOICE_BACKOFF_MS", 500)),
                concurrency: env_or("BILLING_INVOICE_CONCURRENCY", defaults.invoicing.concurrency),
            },
            now_override,
            data_dir: std::env::var("BILLING_DATA_DIR").unwrap_or(defaults.data_dir),
        }
    }

    /// The clock implied by the configuration.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        match self.now_override {
            Some(now) => Arc::new(FixedClock::new(now)),
            None => Arc::new(SystemClock),
        }
    }

    /// The welcome policy implied by the configuration.
    #[must_use]
    pub fn welcome_policy(&self) -> Arc<dyn WelcomePolicy> {
        match SignupCouponPolicy::new(self.welcome_coupon.amount_cents, self.welcome_coupon.duration)
        {
            Some(policy) => Arc::new(policy),
            None => Arc::new(NoWelcomeCoupon),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            listing_limit: 100,
            welcome_coupon: WelcomeCouponConfig {
                amount_cents: 5500,
                duration: 2,
            },
            pricing: UsagePricing::default(),
            invoicing: InvoicingConfig {
                attempts: 3,
                backoff: Duration::from_millis(500),
                concurrency: 4,
            },
            now_override: None,
            data_dir: "/data/tally-billing".into(),
        }
    }
}

/// Read and parse an environment variable, falling back to `default`.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = %name, value = %raw, "Ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}
