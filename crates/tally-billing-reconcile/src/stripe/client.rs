//! Stripe API client implementation.

use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::types::{InvoiceItem, StripeErrorResponse, StripeInvoice};
use crate::error::ProviderError;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error ({status}): {error_type} - {message}")]
    Api {
        /// HTTP status.
        status: StatusCode,
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<StripeError> for ProviderError {
    fn from(err: StripeError) -> Self {
        match &err {
            StripeError::Http(_) => Self::Unavailable(err.to_string()),
            StripeError::Api { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() =>
            {
                Self::Unavailable(err.to_string())
            }
            StripeError::Api { .. } | StripeError::Configuration(_) => {
                Self::Rejected(err.to_string())
            }
        }
    }
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Stripe API base URL.
    pub const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, StripeError> {
        Self::with_base_url(api_key, Self::BASE_URL, Duration::from_secs(30))
    }

    /// Create a client against another base URL (a proxy or a test server).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StripeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StripeError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Add a pending invoice item to a customer.
    ///
    /// # Arguments
    ///
    /// * `customer_id` - Stripe customer ID
    /// * `amount_cents` - Amount in cents; negative for discounts
    /// * `description` - Line shown on the invoice
    /// * `idempotency_key` - Key making retries of this call safe
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn create_invoice_item(
        &self,
        customer_id: &str,
        amount_cents: i64,
        description: &str,
        idempotency_key: &str,
    ) -> Result<InvoiceItem, StripeError> {
        let params = [
            ("customer", customer_id.to_string()),
            ("amount", amount_cents.to_string()),
            ("currency", "usd".to_string()),
            ("description", description.to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/invoiceitems", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .header("Idempotency-Key", idempotency_key)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create an invoice collecting the customer's pending items.
    ///
    /// The invoice is auto-advanced, so Stripe finalizes and charges it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn create_invoice(
        &self,
        customer_id: &str,
        metadata: &[(&str, String)],
        idempotency_key: &str,
    ) -> Result<StripeInvoice, StripeError> {
        let mut params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("auto_advance".to_string(), "true".to_string()),
            (
                "pending_invoice_items_behavior".to_string(),
                "include".to_string(),
            ),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/invoices", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .header("Idempotency-Key", idempotency_key)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                status,
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                status,
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}
