//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nerbixa_billing::BillingError;
use serde_json::json;

/// Shown when a metered call does not fit the caller's balance
pub const GENERATION_LIMIT_MESSAGE: &str =
    "Your generation limit has been reached. Please purchase additional generations.";

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Webhook errors
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Webhook rejected: {0}")]
    WebhookRejected(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    // Billing errors
    #[error("{}", GENERATION_LIMIT_MESSAGE)]
    InsufficientCredits,
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    // Upstream errors
    #[error("Upstream provider error: {0}")]
    Upstream(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Webhooks
            ApiError::InvalidSignature => (StatusCode::FORBIDDEN, "INVALID_SIGNATURE", self.to_string()),
            ApiError::WebhookRejected(msg) => (StatusCode::FORBIDDEN, "WEBHOOK_REJECTED", msg.clone()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Billing
            ApiError::InsufficientCredits => (StatusCode::FORBIDDEN, "INSUFFICIENT_CREDITS", self.to_string()),
            ApiError::GatewayRejected(msg) => (StatusCode::BAD_REQUEST, "GATEWAY_REJECTED", msg.clone()),

            // Upstream
            ApiError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR", "Internal Error".to_string()),

            // Internal
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::WebhookSignatureInvalid | BillingError::WebhookSignatureMissing => {
                ApiError::InvalidSignature
            }
            BillingError::WebhookPayloadInvalid(msg) => ApiError::WebhookRejected(msg),
            BillingError::CreditQuantityMissing(_) => {
                ApiError::WebhookRejected("Generations not found.".to_string())
            }
            BillingError::UserNotFound(_) => ApiError::WebhookRejected("User not found.".to_string()),
            BillingError::InsufficientCredits { .. } => ApiError::InsufficientCredits,
            BillingError::InvalidInput(msg) => ApiError::BadRequest(msg),
            BillingError::AlreadyExists(msg) => ApiError::Conflict(msg),
            BillingError::GatewayRejected(msg) => ApiError::GatewayRejected(msg),
            BillingError::Gateway(msg) => {
                tracing::error!(error = %msg, "Payment gateway unreachable");
                ApiError::Upstream(msg)
            }
            BillingError::Database(msg) => {
                tracing::error!(error = %msg, "Billing database error");
                ApiError::Database(msg)
            }
            BillingError::UnpricedTool(tool) => {
                tracing::error!(tool = %tool, "Tool has no configured price");
                ApiError::Internal
            }
            BillingError::Config(msg) | BillingError::Internal(msg) => {
                tracing::error!(error = %msg, "Billing error");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_insufficient_credits_message() {
        let (status, body) = body_json(ApiError::InsufficientCredits).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_CREDITS");
        assert_eq!(body["error"]["message"], GENERATION_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_upstream_error_hides_details() {
        let (status, body) = body_json(ApiError::Upstream("openai: 429".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "Internal Error");
    }

    #[test]
    fn test_billing_error_mapping() {
        assert!(matches!(
            ApiError::from(BillingError::WebhookSignatureMissing),
            ApiError::InvalidSignature
        ));
        assert!(matches!(
            ApiError::from(BillingError::CreditQuantityMissing("x".to_string())),
            ApiError::WebhookRejected(_)
        ));
        assert!(matches!(
            ApiError::from(BillingError::Config("x".to_string())),
            ApiError::Internal
        ));
        assert!(matches!(
            ApiError::from(BillingError::InvalidInput("x".to_string())),
            ApiError::BadRequest(_)
        ));
    }
}
