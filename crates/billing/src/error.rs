//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook signature missing")]
    WebhookSignatureMissing,

    #[error("Malformed webhook payload: {0}")]
    WebhookPayloadInvalid(String),

    #[error("Credit quantity not found in description: {0}")]
    CreditQuantityMissing(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Insufficient credits for {tool}: price {price}, remaining {remaining}")]
    InsufficientCredits {
        tool: String,
        price: u32,
        remaining: i32,
    },

    #[error("No price configured for tool: {0}")]
    UnpricedTool(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Gateway(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
