//! Stripe invoice sink.
//!
//! Each finalized invoice becomes one Stripe invoice item per line (usage
//! charges and negative discount lines) followed by an auto-advanced Stripe
//! invoice that collects them. Every request carries an idempotency key derived
//! from the user and period, so resubmitting a period never bills twice.

pub mod client;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tally_billing_core::{Invoice, UserId};

pub use client::{StripeClient, StripeError};
pub use types::*;

use crate::collaborators::{InvoiceSink, ProviderInvoiceId};
use crate::error::ProviderError;

/// Stripe connection settings.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key.
    pub api_key: Option<String>,

    /// API base URL (default: `https://api.stripe.com/v1`).
    pub base_url: String,

    /// Request timeout (default: 30s).
    pub timeout: Duration,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
}

impl StripeConfig {
    /// Load settings from `.secrets/stripe.json` or environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: load_api_key(),
            base_url: std::env::var("STRIPE_API_BASE_URL")
                .unwrap_or_else(|_| StripeClient::BASE_URL.into()),
            timeout: Duration::from_secs(
                std::env::var("STRIPE_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Build a client from these settings.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Configuration` if no API key is configured.
    pub fn client(&self) -> Result<StripeClient, StripeError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| StripeError::Configuration("STRIPE_API_KEY is not set".into()))?;
        StripeClient::with_base_url(api_key, &self.base_url, self.timeout)
    }
}

fn load_api_key() -> Option<String> {
    for path in [".secrets/stripe.json", "../.secrets/stripe.json"] {
        let Ok(contents) = std::fs::read_to_string(Path::new(path)) else {
            continue;
        };
        match serde_json::from_str::<StripeSecrets>(&contents) {
            Ok(secrets) => {
                tracing::info!(path = %path, "Loaded Stripe secrets from file");
                return Some(secrets.api_key);
            }
            Err(e) => tracing::warn!(path = %path, error = %e, "Ignoring malformed secrets file"),
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    std::env::var("STRIPE_API_KEY").ok()
}

/// Maps users to Stripe customers.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// The Stripe customer of a user, if one exists.
    async fn customer_id(&self, user_id: &UserId) -> Result<Option<String>, ProviderError>;
}

/// Submits invoices to Stripe.
pub struct StripeInvoiceSink {
    client: StripeClient,
    customers: Arc<dyn CustomerDirectory>,
}

impl StripeInvoiceSink {
    /// Create a sink.
    #[must_use]
    pub fn new(client: StripeClient, customers: Arc<dyn CustomerDirectory>) -> Self {
        Self { client, customers }
    }
}

#[async_trait]
impl InvoiceSink for StripeInvoiceSink {
    async fn submit(
        &self,
        invoice: &Invoice,
        idempotency_key: &str,
    ) -> Result<ProviderInvoiceId, ProviderError> {
        let customer = self
            .customers
            .customer_id(&invoice.user_id)
            .await?
            .ok_or(ProviderError::UnknownCustomer(invoice.user_id))?;

        for (index, line) in invoice.line_items.iter().enumerate() {
            if line.amount_cents == 0 {
                continue;
            }
            self.client
                .create_invoice_item(
                    &customer,
                    line.amount_cents,
                    &line.description,
                    &format!("{idempotency_key}:item:{index}"),
                )
                .await?;
        }

        let metadata = [
            ("user_id", invoice.user_id.to_string()),
            ("period", invoice.period.to_string()),
            ("net_cents", invoice.net_cents.to_string()),
        ];
        let created = self
            .client
            .create_invoice(&customer, &metadata, &format!("{idempotency_key}:invoice"))
            .await?;

        tracing::debug!(
            user_id = %invoice.user_id,
            invoice_id = %created.id,
            amount_due = created.amount_due,
            "Created Stripe invoice"
        );
        Ok(ProviderInvoiceId(created.id))
    }
}
