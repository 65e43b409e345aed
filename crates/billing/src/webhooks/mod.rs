//! Inbound payment notifications
//!
//! - [`card`]: RSA-signed card processor notifications that credit balances
//! - [`gateway`]: HMAC-signed gateway notifications, verified and logged

pub mod card;
pub mod gateway;

pub use card::{CardNotification, CardWebhookHandler, CardWebhookOutcome, CARD_PROCESSOR};
pub use gateway::{GatewayNotification, GatewayStatus, GatewayTransactionType, GatewayWebhookHandler};
