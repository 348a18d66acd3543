//! Stripe API types.

use serde::Deserialize;

/// Stripe invoice item object.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItem {
    /// Invoice item ID.
    pub id: String,
    /// Amount in cents (negative for discounts).
    #[serde(default)]
    pub amount: i64,
    /// Currency (e.g., "usd").
    #[serde(default)]
    pub currency: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Description shown on the invoice.
    #[serde(default)]
    pub description: Option<String>,
}

/// Stripe invoice object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    /// Invoice ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Invoice status (draft, open, paid, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Amount due in cents.
    #[serde(default)]
    pub amount_due: i64,
    /// Whether Stripe finalizes the invoice automatically.
    #[serde(default)]
    pub auto_advance: bool,
    /// Metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Stripe error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// The error details.
    pub error: StripeErrorBody,
}

/// Stripe error details.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    /// Error type (`api_error`, `card_error`, `invalid_request_error`, ...).
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
