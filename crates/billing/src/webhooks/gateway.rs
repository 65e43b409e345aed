//! Payment gateway webhook
//!
//! The gateway posts JSON notifications carrying an HMAC-SHA256 `signature`
//! over the other fields. Notifications are verified and logged; they never
//! touch balances.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{BillingError, BillingResult};
use crate::signature::hmac_verify;

/// Payment status reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
    Canceled,
    Refunded,
    Unknown(String),
}

impl From<&str> for GatewayStatus {
    fn from(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "pending" => Self::Pending,
            "canceled" => Self::Canceled,
            "refunded" => Self::Refunded,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Pending => write!(f, "pending"),
            Self::Canceled => write!(f, "canceled"),
            Self::Refunded => write!(f, "refunded"),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Transaction type reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayTransactionType {
    Payment,
    Refund,
    Chargeback,
    Unknown(String),
}

impl From<&str> for GatewayTransactionType {
    fn from(s: &str) -> Self {
        match s {
            "payment" => Self::Payment,
            "refund" => Self::Refund,
            "chargeback" => Self::Chargeback,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for GatewayTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payment => write!(f, "payment"),
            Self::Refund => write!(f, "refund"),
            Self::Chargeback => write!(f, "chargeback"),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// A verified gateway notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayNotification {
    pub status: GatewayStatus,
    pub kind: GatewayTransactionType,
    pub order_id: Option<String>,
    pub transaction_id: Option<String>,
}

fn field(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Webhook handler for the payment gateway
#[derive(Debug, Clone)]
pub struct GatewayWebhookHandler {
    secret: Option<String>,
}

impl GatewayWebhookHandler {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Verify the notification signature and log the reported transition
    pub fn handle(&self, raw_body: &str) -> BillingResult<GatewayNotification> {
        let body: Value = serde_json::from_str(raw_body).map_err(|e| {
            tracing::error!(error = %e, "Gateway webhook body is not JSON");
            BillingError::Internal(format!("invalid JSON body: {e}"))
        })?;
        let params = body.as_object().ok_or_else(|| {
            tracing::error!("Gateway webhook body is not a JSON object");
            BillingError::Internal("body must be a JSON object".to_string())
        })?;

        let secret = self.secret.as_deref().ok_or_else(|| {
            tracing::error!("NETWORX_SECRET_KEY not configured");
            BillingError::Config("NETWORX_SECRET_KEY is not configured".to_string())
        })?;

        let signature = match params.get("signature") {
            Some(Value::String(s)) if !s.is_empty() => s.as_str(),
            _ => {
                tracing::warn!("Gateway webhook without signature");
                return Err(BillingError::WebhookSignatureMissing);
            }
        };

        if !hmac_verify(params, signature, secret) {
            tracing::warn!("Gateway webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let notification = GatewayNotification {
            status: field(params, "status").as_deref().unwrap_or_default().into(),
            kind: field(params, "type").as_deref().unwrap_or_default().into(),
            order_id: field(params, "order_id"),
            transaction_id: field(params, "transaction_id"),
        };
        log_notification(&notification, params);

        Ok(notification)
    }
}

fn log_notification(n: &GatewayNotification, params: &Map<String, Value>) {
    let order_id = n.order_id.as_deref().unwrap_or("-");
    let transaction_id = n.transaction_id.as_deref().unwrap_or("-");

    match &n.status {
        GatewayStatus::Success => tracing::info!(
            order_id = %order_id,
            transaction_id = %transaction_id,
            amount = ?field(params, "amount"),
            currency = ?field(params, "currency"),
            "Gateway payment successful"
        ),
        GatewayStatus::Failed => tracing::warn!(
            order_id = %order_id,
            transaction_id = %transaction_id,
            error_message = ?field(params, "error_message"),
            "Gateway payment failed"
        ),
        GatewayStatus::Pending => {
            tracing::info!(order_id = %order_id, "Gateway payment pending")
        }
        GatewayStatus::Canceled => {
            tracing::info!(order_id = %order_id, "Gateway payment canceled")
        }
        GatewayStatus::Refunded => {
            tracing::info!(order_id = %order_id, "Gateway payment refunded")
        }
        GatewayStatus::Unknown(status) => tracing::warn!(
            order_id = %order_id,
            status = %status,
            "Unknown gateway payment status"
        ),
    }

    match &n.kind {
        GatewayTransactionType::Unknown(kind) => {
            tracing::debug!(kind = %kind, "Processing gateway transaction of unknown type")
        }
        kind => tracing::debug!(kind = %kind, "Processing gateway transaction"),
    }
}
