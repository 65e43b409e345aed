//! Payment gateway checkout
//!
//! Creates hosted-checkout payment tokens and looks up payment status. Both
//! calls are signed the same way gateway webhooks are, and authenticated with
//! HTTP Basic `shop_id:secret`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::signature::hmac_sign;

const DEFAULT_API_URL: &str = "https://gateway.networxpay.com";
const CHECKOUT_URL: &str = "https://checkout.networxpay.com";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_DESCRIPTION: &str = "Payment for order";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub api_url: String,
    pub return_url: String,
    pub cancel_url: String,
    pub notification_url: String,
    /// Simulate token creation locally instead of calling the gateway
    pub test_mode: bool,
}

impl GatewayConfig {
    /// Create config from environment variables. `public_url` is used to
    /// derive the redirect and notification URLs when they are not set.
    pub fn from_env(public_url: &str) -> Self {
        let public_url = public_url.trim_end_matches('/');
        Self {
            shop_id: std::env::var("NETWORX_SHOP_ID").unwrap_or_default(),
            secret_key: std::env::var("NETWORX_SECRET_KEY").unwrap_or_default(),
            api_url: std::env::var("NETWORX_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            return_url: std::env::var("NETWORX_RETURN_URL")
                .unwrap_or_else(|_| format!("{public_url}/payment/success")),
            cancel_url: std::env::var("NETWORX_CANCEL_URL")
                .unwrap_or_else(|_| format!("{public_url}/payment/cancel")),
            notification_url: std::env::var("NETWORX_WEBHOOK_URL")
                .unwrap_or_else(|_| format!("{public_url}/api/v1/webhooks/networx")),
            test_mode: std::env::var("NETWORX_TEST_MODE")
                .map(|v| v == "true")
                .unwrap_or(false),
        }
    }

    /// Secret used to verify gateway webhooks, if configured
    pub fn webhook_secret(&self) -> Option<String> {
        Some(self.secret_key.clone()).filter(|s| !s.is_empty())
    }

    fn credentials(&self) -> BillingResult<(&str, &str)> {
        if self.shop_id.is_empty() || self.secret_key.is_empty() {
            return Err(BillingError::Config(
                "NETWORX_SHOP_ID and NETWORX_SECRET_KEY must be set".to_string(),
            ));
        }
        Ok((&self.shop_id, &self.secret_key))
    }
}

/// Token creation request from the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    /// Major currency units
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub order_id: Option<String>,
    pub description: Option<String>,
    pub customer_email: Option<String>,
}

/// Created payment token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
    pub payment_url: String,
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Status lookup by token or order id
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub token: Option<String>,
    pub order_id: Option<String>,
}

/// Payment status as reported by the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: Value,
    pub transaction: Value,
}

#[derive(Debug, Deserialize)]
struct GatewayTokenResult {
    #[serde(default)]
    success: bool,
    token: Option<String>,
    payment_url: Option<String>,
    transaction_id: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

fn now_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..9].to_string()
}

fn payment_url(token: &str) -> String {
    format!("{CHECKOUT_URL}?token={token}")
}

/// Amount in major units and order id, both mandatory
fn required_fields(request: &TokenRequest) -> BillingResult<(f64, String)> {
    let missing = || BillingError::InvalidInput("Amount and orderId are required".to_string());
    let amount = request
        .amount
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(missing)?;
    let order_id = non_empty(request.order_id.clone()).ok_or_else(missing)?;
    Ok((amount, order_id))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Client for the gateway's checkout API
#[derive(Clone)]
pub struct GatewayCheckout {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayCheckout {
    pub fn new(config: GatewayConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Signed request fields for a token
    fn token_params(&self, request: TokenRequest) -> BillingResult<Map<String, Value>> {
        let (amount, order_id) = required_fields(&request)?;
        let (shop_id, secret) = self.config.credentials()?;

        let mut params = Map::new();
        params.insert("shop_id".to_string(), json!(shop_id));
        params.insert("amount".to_string(), json!((amount * 100.0).round() as i64));
        params.insert(
            "currency".to_string(),
            json!(non_empty(request.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string())),
        );
        params.insert(
            "description".to_string(),
            json!(non_empty(request.description).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string())),
        );
        params.insert("order_id".to_string(), json!(order_id));
        if let Some(email) = non_empty(request.customer_email) {
            params.insert("customer_email".to_string(), json!(email));
        }
        params.insert("return_url".to_string(), json!(self.config.return_url));
        params.insert("cancel_url".to_string(), json!(self.config.cancel_url));
        params.insert("notification_url".to_string(), json!(self.config.notification_url));
        params.insert(
            "test_mode".to_string(),
            json!(if self.config.test_mode { 1 } else { 0 }),
        );

        let signature = hmac_sign(&params, secret)?;
        params.insert("signature".to_string(), json!(signature));
        Ok(params)
    }

    /// Create a payment token for a hosted checkout page
    pub async fn create_token(&self, request: TokenRequest) -> BillingResult<TokenResponse> {
        // Test mode needs no gateway credentials
        if self.config.test_mode {
            let (_, order_id) = required_fields(&request)?;
            let token = format!("test_{}_{}", now_millis(), random_suffix());
            tracing::info!(order_id = %order_id, token = %token, "Simulated gateway token (test mode)");
            return Ok(TokenResponse {
                success: true,
                payment_url: payment_url(&token),
                transaction_id: Some(format!("txn_{}_{}", now_millis(), random_suffix())),
                token,
                test_mode: Some(true),
                message: Some("Test payment token created successfully (development mode)".to_string()),
            });
        }

        let params = self.token_params(request)?;
        let order_id = params.get("order_id").and_then(Value::as_str).unwrap_or_default();
        let (shop_id, secret) = self.config.credentials()?;
        let response = self
            .client
            .post(format!("{}/v3/token", self.config.api_url))
            .basic_auth(shop_id, Some(secret))
            .header("Accept", "application/json")
            .json(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(order_id = %order_id, error = %e, "Failed to reach payment gateway");
                BillingError::Gateway(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(order_id = %order_id, status = %status, body = %body, "Gateway token request failed");
            return Err(BillingError::GatewayRejected(format!(
                "API returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let result: GatewayTokenResult = response.json().await?;
        match result.token {
            Some(token) if !token.is_empty() => {
                tracing::info!(order_id = %order_id, "Gateway token created");
                Ok(TokenResponse {
                    success: true,
                    payment_url: result.payment_url.unwrap_or_else(|| payment_url(&token)),
                    token,
                    transaction_id: result.transaction_id,
                    test_mode: None,
                    message: None,
                })
            }
            _ => {
                let details = result
                    .error
                    .or(result.message)
                    .unwrap_or_else(|| "Unknown error".to_string());
                tracing::warn!(order_id = %order_id, success = result.success, details = %details, "Gateway returned no token");
                Err(BillingError::GatewayRejected(details))
            }
        }
    }

    /// Look up a payment by token or order id
    pub async fn check_status(&self, query: StatusQuery) -> BillingResult<StatusResponse> {
        let token = non_empty(query.token);
        let order_id = non_empty(query.order_id);
        if token.is_none() && order_id.is_none() {
            return Err(BillingError::InvalidInput("Token or orderId is required".to_string()));
        }
        let (shop_id, secret) = self.config.credentials()?;

        let mut params = Map::new();
        params.insert("shop_id".to_string(), json!(shop_id));
        if let Some(token) = token {
            params.insert("token".to_string(), json!(token));
        }
        if let Some(order_id) = order_id {
            params.insert("order_id".to_string(), json!(order_id));
        }
        let signature = hmac_sign(&params, secret)?;
        params.insert("signature".to_string(), json!(signature));

        let response = self
            .client
            .post(format!("{}/v3/status", self.config.api_url))
            .basic_auth(shop_id, Some(secret))
            .header("Accept", "application/json")
            .json(&params)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        let status = response.status();
        let result: Value = response.json().await?;
        if !status.is_success() {
            tracing::warn!(status = %status, details = %result, "Gateway status lookup failed");
            return Err(BillingError::GatewayRejected(result.to_string()));
        }

        Ok(StatusResponse {
            success: true,
            status: result.get("status").cloned().unwrap_or(Value::Null),
            transaction: result,
        })
    }
}
