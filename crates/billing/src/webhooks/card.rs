//! Card processor webhook
//!
//! The processor posts a JSON notification whose raw body is signed with its
//! RSA key. A `successful` transaction rolls the user's balance over
//! (`available = available - used + bought`, `used = 0`), is appended to the
//! payment log and triggers a receipt email.

use std::sync::{Arc, OnceLock};

use nerbixa_shared::{NewPaymentTransaction, UserBalance};
use regex::Regex;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::email::ReceiptMailer;
use crate::error::{BillingError, BillingResult};
use crate::ledger::{CreditLedger, CreditOutcome, PaymentCredit};
use crate::receipt::{format_paid_date, ReceiptData};
use crate::signature::RsaBodyVerifier;

/// Dedupe namespace of this processor
pub const CARD_PROCESSOR: &str = "card";

/// Request header carrying the base64 RSA signature
pub const SIGNATURE_HEADER: &str = "content-signature";

const SUCCESSFUL: &str = "successful";

/// Notification envelope
#[derive(Debug, Clone, Deserialize)]
pub struct CardNotification {
    pub transaction: CardTransaction,
}

/// Transaction as reported by the processor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardTransaction {
    pub uid: Option<String>,
    pub status: Option<String>,
    /// Set at checkout to the user's external identity
    pub tracking_id: Option<String>,
    /// Minor currency units
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub payment_method_type: Option<String>,
    pub message: Option<String>,
    pub paid_at: Option<String>,
    pub receipt_url: Option<String>,
}

/// What a verified notification led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardWebhookOutcome {
    Credited {
        clerk_id: String,
        quantity: i32,
        balance: UserBalance,
        receipt_sent: bool,
    },
    /// Same transaction uid seen before
    AlreadyProcessed,
    /// Status other than `successful`; nothing written
    NotSuccessful { status: String },
}

fn quantity_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\((\d+)\sTokens\)").ok())
        .as_ref()
}

/// Credits bought, taken from the `(N Tokens)` marker in the description.
/// No marker means the notification is rejected, never credited as zero.
pub fn parse_credit_quantity(description: &str) -> BillingResult<i32> {
    let pattern = quantity_pattern()
        .ok_or_else(|| BillingError::Internal("credit pattern failed to compile".to_string()))?;

    pattern
        .captures(description)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .ok_or_else(|| BillingError::CreditQuantityMissing(description.to_string()))
}

fn required(field: Option<String>, name: &str) -> BillingResult<String> {
    field
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BillingError::WebhookPayloadInvalid(format!("missing transaction.{name}")))
}

/// Webhook handler for the card processor
pub struct CardWebhookHandler {
    verifier: Option<RsaBodyVerifier>,
    ledger: Arc<dyn CreditLedger>,
    mailer: Arc<dyn ReceiptMailer>,
}

impl CardWebhookHandler {
    /// `public_key` is the processor's SPKI key, PEM or bare base64. Without
    /// one every notification fails as a configuration error.
    pub fn new(
        public_key: Option<&str>,
        ledger: Arc<dyn CreditLedger>,
        mailer: Arc<dyn ReceiptMailer>,
    ) -> BillingResult<Self> {
        let verifier = public_key
            .filter(|k| !k.trim().is_empty())
            .map(RsaBodyVerifier::from_public_key)
            .transpose()?;

        Ok(Self {
            verifier,
            ledger,
            mailer,
        })
    }

    /// Verify the signature over the exact received body, then parse it
    pub fn verify_event(
        &self,
        raw_body: &str,
        signature: Option<&str>,
    ) -> BillingResult<CardNotification> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| BillingError::Config("SHOP_PUBLIC_KEY is not configured".to_string()))?;

        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(BillingError::WebhookSignatureMissing)?;

        if !verifier.verify(raw_body.as_bytes(), signature) {
            tracing::warn!(body_len = raw_body.len(), "Card webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        serde_json::from_str(raw_body).map_err(|e| {
            tracing::warn!(error = %e, "Card webhook body is not a valid notification");
            BillingError::WebhookPayloadInvalid(e.to_string())
        })
    }

    /// Verify and apply a notification
    pub async fn handle(
        &self,
        raw_body: &str,
        signature: Option<&str>,
    ) -> BillingResult<CardWebhookOutcome> {
        let notification = self.verify_event(raw_body, signature)?;
        let tx = notification.transaction;

        let status = tx.status.clone().unwrap_or_default();
        if status != SUCCESSFUL {
            tracing::info!(
                status = %status,
                uid = ?tx.uid,
                "Card transaction was not successful, ignoring"
            );
            return Ok(CardWebhookOutcome::NotSuccessful { status });
        }

        let uid = required(tx.uid, "uid")?;
        let clerk_id = required(tx.tracking_id, "tracking_id")?;
        let description = tx.description.unwrap_or_default();
        let quantity = parse_credit_quantity(&description).inspect_err(|_| {
            tracing::warn!(uid = %uid, description = %description, "No credit quantity in description");
        })?;
        let amount = tx
            .amount
            .ok_or_else(|| BillingError::WebhookPayloadInvalid("missing transaction.amount".to_string()))?;
        let currency = required(tx.currency, "currency")?;

        let credit = PaymentCredit {
            processor: CARD_PROCESSOR.to_string(),
            event_ref: uid.clone(),
            clerk_id: clerk_id.clone(),
            quantity,
            transaction: NewPaymentTransaction {
                tracking_id: clerk_id.clone(),
                processor_uid: uid.clone(),
                user_id: clerk_id.clone(),
                status,
                amount,
                currency: currency.clone(),
                description: description.clone(),
                kind: tx.kind,
                payment_method_type: tx.payment_method_type,
                message: tx.message,
                paid_at: tx.paid_at.clone(),
                receipt_url: tx.receipt_url,
            },
        };

        let (balance, email) = match self.ledger.apply_payment(credit).await? {
            CreditOutcome::Credited { balance, email } => (balance, email),
            CreditOutcome::Duplicate => {
                tracing::info!(uid = %uid, "Card webhook already processed, skipping");
                return Ok(CardWebhookOutcome::AlreadyProcessed);
            }
            CreditOutcome::UserNotFound => {
                tracing::warn!(uid = %uid, tracking_id = %clerk_id, "Card webhook for unknown user");
                return Err(BillingError::UserNotFound(clerk_id));
            }
        };

        tracing::info!(
            uid = %uid,
            clerk_id = %clerk_id,
            quantity = quantity,
            available = balance.available_generations,
            "Credits applied from card payment"
        );

        let receipt = ReceiptData {
            receipt_id: uid.clone(),
            email: email.clone(),
            date: format_paid_date(tx.paid_at.as_deref(), OffsetDateTime::now_utc()),
            tokens: quantity,
            description,
            amount,
            currency,
        };
        // Payment is committed; the receipt must not change the response
        let receipt_sent = match self.mailer.send_receipt(&email, &receipt).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::error!(uid = %uid, error = %e, "Failed to send receipt - non-fatal");
                false
            }
        };

        Ok(CardWebhookOutcome::Credited {
            clerk_id,
            quantity,
            balance,
            receipt_sent,
        })
    }
}
