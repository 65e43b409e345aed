// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Nerbixa Billing Module
//!
//! Credit metering and payment reconciliation for the generation tools.
//!
//! ## Features
//!
//! - **Credit Ledger**: Per-user balance counters and the payment log
//! - **Limit Checks**: Pure headroom-versus-price comparison
//! - **Usage Metering**: Reserve credits before a generation, release on failure
//! - **Card Webhooks**: RSA-verified payment notifications that top up balances
//! - **Gateway**: HMAC-signed checkout tokens, status lookups and webhooks
//! - **Receipts**: Fixed-layout receipt documents delivered by email

pub mod checkout;
pub mod email;
pub mod error;
pub mod ledger;
pub mod limit;
pub mod receipt;
pub mod signature;
pub mod usage;
pub mod webhooks;

// Checkout
pub use checkout::{
    GatewayCheckout, GatewayConfig, StatusQuery, StatusResponse, TokenRequest, TokenResponse,
};

// Email
pub use email::{BillingEmailService, EmailConfig, ReceiptMailer};
#[cfg(any(test, feature = "testing"))]
pub use email::RecordingMailer;

// Error
pub use error::{BillingError, BillingResult};

// Ledger
pub use ledger::{CreditLedger, CreditOutcome, PaymentCredit, PgCreditLedger};
#[cfg(any(test, feature = "testing"))]
pub use ledger::InMemoryCreditLedger;

// Limit
pub use limit::{check_api_limit, has_sufficient_credits, price_for};

// Receipt
pub use receipt::{render_html, ReceiptData};

// Usage
pub use usage::{CreditReservation, UsageMeter};

// Webhooks
pub use webhooks::{
    CardWebhookHandler, CardWebhookOutcome, GatewayNotification, GatewayWebhookHandler,
};

use std::sync::Arc;

use nerbixa_shared::PriceTable;
use sqlx::PgPool;

/// Settings the billing service needs beyond its environment variables
#[derive(Debug, Clone)]
pub struct BillingSettings {
    /// Card processor public key (PEM or bare base64)
    pub shop_public_key: Option<String>,
    pub prices: PriceTable,
    pub gateway: GatewayConfig,
    pub email: EmailConfig,
}

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub ledger: Arc<dyn CreditLedger>,
    pub usage: UsageMeter,
    pub card_webhooks: Arc<CardWebhookHandler>,
    pub gateway_webhooks: GatewayWebhookHandler,
    pub checkout: GatewayCheckout,
}

impl BillingService {
    /// Create a billing service backed by Postgres
    pub fn from_settings(
        settings: BillingSettings,
        pool: PgPool,
        http_client: reqwest::Client,
    ) -> BillingResult<Self> {
        let mailer: Arc<dyn ReceiptMailer> = Arc::new(BillingEmailService::new(
            settings.email.clone(),
            http_client.clone(),
        ));
        Self::new(settings, Arc::new(PgCreditLedger::new(pool)), mailer, http_client)
    }

    /// Create a billing service from explicit collaborators
    pub fn new(
        settings: BillingSettings,
        ledger: Arc<dyn CreditLedger>,
        mailer: Arc<dyn ReceiptMailer>,
        http_client: reqwest::Client,
    ) -> BillingResult<Self> {
        let card_webhooks = CardWebhookHandler::new(
            settings.shop_public_key.as_deref(),
            ledger.clone(),
            mailer,
        )?;

        Ok(Self {
            usage: UsageMeter::new(ledger.clone(), settings.prices),
            card_webhooks: Arc::new(card_webhooks),
            gateway_webhooks: GatewayWebhookHandler::new(settings.gateway.webhook_secret()),
            checkout: GatewayCheckout::new(settings.gateway, http_client),
            ledger,
        })
    }
}
