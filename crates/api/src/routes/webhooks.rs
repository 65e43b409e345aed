//! Payment processor webhook routes
//!
//! Both handlers take the body as raw text: signatures are verified over the
//! exact bytes the processor sent, before anything is parsed.

use axum::{extract::State, http::HeaderMap, Json};
use nerbixa_billing::{webhooks::card::SIGNATURE_HEADER, BillingError, CardWebhookOutcome};
use serde::Serialize;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/v1/webhooks/payment
pub async fn card_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let outcome = state
        .billing
        .card_webhooks
        .handle(&body, signature)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Card webhook rejected");
            ApiError::from(e)
        })?;

    let (success, message) = match outcome {
        CardWebhookOutcome::Credited {
            clerk_id,
            quantity,
            receipt_sent,
            ..
        } => {
            tracing::info!(
                clerk_id = %clerk_id,
                quantity = quantity,
                receipt_sent = receipt_sent,
                "Card webhook processed"
            );
            (true, "Success Response")
        }
        CardWebhookOutcome::AlreadyProcessed => (true, "Already processed"),
        CardWebhookOutcome::NotSuccessful { .. } => (false, "Transaction was not successful"),
    };

    Ok(Json(WebhookResponse {
        success,
        message: message.to_string(),
    }))
}

/// POST /api/v1/webhooks/networx
pub async fn gateway_notification(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<Value>> {
    let notification = state
        .billing
        .gateway_webhooks
        .handle(&body)
        .map_err(|e| match e {
            BillingError::WebhookSignatureMissing => {
                ApiError::BadRequest("Missing signature".to_string())
            }
            other => ApiError::from(other),
        })?;

    tracing::debug!(
        order_id = ?notification.order_id,
        status = %notification.status,
        "Gateway webhook acknowledged"
    );

    Ok(Json(json!({ "status": "ok" })))
}

/// GET /api/v1/webhooks/networx
pub async fn gateway_liveness() -> Json<Value> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Json(json!({
        "message": "Networx webhook endpoint is active",
        "timestamp": timestamp,
    }))
}
