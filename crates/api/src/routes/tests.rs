//! Router-level tests against in-memory collaborators

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use nerbixa_billing::{
    signature::hmac_sign, BillingService, BillingSettings, CreditLedger, EmailConfig,
    GatewayConfig, InMemoryCreditLedger, RecordingMailer,
};
use nerbixa_shared::{PriceTable, UserBalance};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use super::create_router;
use crate::auth::{AuthUser, MockIdentityResolver};
use crate::error::GENERATION_LIMIT_MESSAGE;
use crate::providers::{GenerationRequest, MockGenerationProvider, ProviderError};
use crate::state::AppState;

const CARD_PRIVATE_KEY: &str = include_str!("../../../billing/testdata/card_webhook_test_key.pem");
const CARD_PUBLIC_KEY: &str = include_str!("../../../billing/testdata/card_webhook_test_pub.pem");
const GATEWAY_SECRET: &str = "gw_test_secret";

struct Harness {
    app: Router,
    ledger: Arc<InMemoryCreditLedger>,
    mailer: Arc<RecordingMailer>,
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn balance(&self, clerk_id: &str) -> UserBalance {
        self.ledger.balance(clerk_id).await.unwrap().unwrap()
    }
}

/// Bearer tokens are the caller's clerk id; "bad" is rejected
fn identity() -> MockIdentityResolver {
    let mut resolver = MockIdentityResolver::new();
    resolver.expect_resolve().returning(|token| {
        if token == "bad" {
            return Err(crate::auth::AuthError::InvalidToken);
        }
        Ok(AuthUser {
            clerk_id: token.to_string(),
            email: Some(format!("{token}@example.com")),
        })
    });
    resolver
}

fn settings() -> BillingSettings {
    BillingSettings {
        shop_public_key: Some(CARD_PUBLIC_KEY.to_string()),
        prices: PriceTable::default(),
        gateway: GatewayConfig {
            shop_id: "shop_1".to_string(),
            secret_key: GATEWAY_SECRET.to_string(),
            api_url: "http://127.0.0.1:9".to_string(),
            return_url: "http://localhost:3000/payment/success".to_string(),
            cancel_url: "http://localhost:3000/payment/cancel".to_string(),
            notification_url: "http://localhost:3000/api/v1/webhooks/networx".to_string(),
            test_mode: true,
        },
        email: EmailConfig {
            resend_api_key: String::new(),
            email_from: "Nerbixa <noreply@nerbixa.com>".to_string(),
            support_email: "support@nerbixa.com".to_string(),
            api_url: "http://127.0.0.1:9".to_string(),
        },
    }
}

async fn harness(provider: MockGenerationProvider) -> Harness {
    let ledger = Arc::new(InMemoryCreditLedger::new());
    ledger.insert_user("user_1", "user_1@example.com", 30, 100).await;
    ledger.insert_user("broke", "broke@example.com", 20, 20).await;
    let mailer = Arc::new(RecordingMailer::new());

    let billing = BillingService::new(
        settings(),
        ledger.clone(),
        mailer.clone(),
        reqwest::Client::new(),
    )
    .unwrap();
    let state = AppState::from_parts(billing, Arc::new(provider), Arc::new(identity()));

    Harness {
        app: create_router(state),
        ledger,
        mailer,
    }
}

fn idle_provider() -> MockGenerationProvider {
    let mut provider = MockGenerationProvider::new();
    provider.expect_generate().never();
    provider
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn card_body(uid: &str, status: &str, tracking_id: &str, description: &str) -> String {
    json!({
        "transaction": {
            "uid": uid,
            "status": status,
            "tracking_id": tracking_id,
            "amount": 1999,
            "currency": "USD",
            "description": description,
            "type": "payment",
            "payment_method_type": "credit_card",
            "message": "Successfully processed",
            "paid_at": "2026-10-16T09:00:00Z",
            "receipt_url": "https://example.com/r/1"
        }
    })
    .to_string()
}

fn card_signature(body: &str) -> String {
    let key = RsaPrivateKey::from_pkcs8_pem(CARD_PRIVATE_KEY).unwrap();
    BASE64.encode(SigningKey::<Sha256>::new(key).sign(body.as_bytes()).to_bytes())
}

fn card_webhook(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/webhooks/payment")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Content-Signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_probes_without_database() {
    let h = harness(idle_provider()).await;
    let (status, _) = h.send(get("/health/live", None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.send(get("/health/ready", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Metered generation
// =============================================================================

#[tokio::test]
async fn test_unauthenticated_generation_never_reaches_provider() {
    let h = harness(idle_provider()).await;

    let (status, _) = h
        .send(post_json("/api/v1/image", None, json!({"prompt": "a cat"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .send(post_json("/api/v1/video", Some("bad"), json!({"prompt": "waves"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
}

#[tokio::test]
async fn test_missing_field_is_400() {
    let h = harness(idle_provider()).await;

    let (status, body) = h
        .send_json(post_json("/api/v1/speech", Some("user_1"), json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Prompt is required");

    let (status, body) = h
        .send_json(post_json(
            "/api/v1/style-transfer",
            Some("user_1"),
            json!({"prompt": "van gogh"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Image URL is required");

    let (status, _) = h
        .send(post_json("/api/v1/conversation", Some("user_1"), json!({"messages": []})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
}

#[tokio::test]
async fn test_malformed_body_is_400_envelope() {
    let h = harness(idle_provider()).await;

    let (status, body) = h
        .send_json(post_json("/api/v1/speech", Some("user_1"), json!({"prompt": 5})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/image")
        .header(header::AUTHORIZATION, "Bearer user_1")
        .body(Body::from(json!({"prompt": "a cat"}).to_string()))
        .unwrap();
    let (status, body) = h.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = h
        .send_json(post_json("/api/v1/receipts", Some("user_1"), json!({"receiptId": "r1"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("email"));

    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
}

#[tokio::test]
async fn test_video_is_refused_without_a_price() {
    let h = harness(idle_provider()).await;

    let (status, body) = h
        .send_json(post_json("/api/v1/video", Some("user_1"), json!({"prompt": "waves"})))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
}

#[tokio::test]
async fn test_insufficient_credits_is_403() {
    let h = harness(idle_provider()).await;

    let (status, body) = h
        .send_json(post_json("/api/v1/image", Some("broke"), json!({"prompt": "waves"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], GENERATION_LIMIT_MESSAGE);
    assert_eq!(h.balance("broke").await, UserBalance::new(20, 20));
}

#[tokio::test]
async fn test_unknown_user_cannot_generate() {
    let h = harness(idle_provider()).await;
    let (status, _) = h
        .send(post_json("/api/v1/music", Some("ghost"), json!({"prompt": "lofi"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_successful_generation_consumes_price() {
    let mut provider = MockGenerationProvider::new();
    provider
        .expect_generate()
        .withf(|request| {
            *request
                == GenerationRequest::Image {
                    prompt: "a cat".to_string(),
                    amount: 2,
                    resolution: "512x512".to_string(),
                    model: "dall-e-3".to_string(),
                }
        })
        .times(1)
        .returning(|_| Ok(json!([{"url": "https://img/1"}, {"url": "https://img/2"}])));
    let h = harness(provider).await;

    let (status, body) = h
        .send_json(post_json(
            "/api/v1/image",
            Some("user_1"),
            json!({"prompt": "a cat", "amount": "2", "resolution": "512x512"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[1]["url"], "https://img/2");
    assert_eq!(h.balance("user_1").await, UserBalance::new(44, 100));
}

#[tokio::test]
async fn test_provider_failure_leaves_usage_unchanged() {
    let mut provider = MockGenerationProvider::new();
    provider
        .expect_generate()
        .times(1)
        .returning(|_| Err(ProviderError::Status {
            status: 500,
            body: "boom".to_string(),
        }));
    let h = harness(provider).await;

    let (status, body) = h
        .send_json(post_json(
            "/api/v1/conversation",
            Some("user_1"),
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "Internal Error");
    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
}

// =============================================================================
// Card webhook
// =============================================================================

#[tokio::test]
async fn test_card_webhook_rolls_balance_over() {
    let h = harness(idle_provider()).await;
    let body = card_body("uid-1", "successful", "user_1", "Nerbixa credits (500 Tokens)");

    let (status, response) = h
        .send_json(card_webhook(&body, Some(&card_signature(&body))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], true);
    assert_eq!(h.balance("user_1").await, UserBalance::new(0, 570));
    assert_eq!(h.ledger.transaction_count().await, 1);

    let sent = h.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "user_1@example.com");
    assert_eq!(sent[0].1.tokens, 500);
}

#[tokio::test]
async fn test_card_webhook_redelivery_credits_once() {
    let h = harness(idle_provider()).await;
    let body = card_body("uid-1", "successful", "user_1", "Nerbixa credits (500 Tokens)");
    let signature = card_signature(&body);

    let (first, _) = h.send(card_webhook(&body, Some(&signature))).await;
    let (second, response) = h.send_json(card_webhook(&body, Some(&signature))).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(response["message"], "Already processed");
    assert_eq!(h.balance("user_1").await, UserBalance::new(0, 570));
    assert_eq!(h.ledger.transaction_count().await, 1);
    assert_eq!(h.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn test_card_webhook_without_quantity_writes_nothing() {
    let h = harness(idle_provider()).await;
    let body = card_body("uid-2", "successful", "user_1", "Nerbixa credits");

    let (status, response) = h
        .send_json(card_webhook(&body, Some(&card_signature(&body))))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["message"], "Generations not found.");
    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
    assert_eq!(h.ledger.transaction_count().await, 0);
    assert!(h.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_card_webhook_failed_status_is_acknowledged() {
    let h = harness(idle_provider()).await;
    let body = card_body("uid-3", "failed", "user_1", "Nerbixa credits (500 Tokens)");

    let (status, response) = h
        .send_json(card_webhook(&body, Some(&card_signature(&body))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], false);
    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
    assert_eq!(h.ledger.transaction_count().await, 0);
}

#[tokio::test]
async fn test_card_webhook_rejects_bad_signatures() {
    let h = harness(idle_provider()).await;
    let body = card_body("uid-4", "successful", "user_1", "Nerbixa credits (500 Tokens)");
    let signature = card_signature(&body);
    let tampered = body.replace("500 Tokens", "900 Tokens");

    let (status, _) = h.send(card_webhook(&tampered, Some(&signature))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.send(card_webhook(&body, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
    assert_eq!(h.ledger.transaction_count().await, 0);
}

#[tokio::test]
async fn test_card_webhook_unknown_user_is_403() {
    let h = harness(idle_provider()).await;
    let body = card_body("uid-5", "successful", "ghost", "Nerbixa credits (500 Tokens)");

    let (status, response) = h
        .send_json(card_webhook(&body, Some(&card_signature(&body))))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["message"], "User not found.");
    assert_eq!(h.ledger.transaction_count().await, 0);
}

// =============================================================================
// Gateway webhook
// =============================================================================

fn signed_gateway_body(status: &str) -> Value {
    let mut params = json!({
        "status": status,
        "type": "payment",
        "order_id": "order-1",
        "transaction_id": "tx-1",
    });
    let signature = hmac_sign(params.as_object().unwrap(), GATEWAY_SECRET).unwrap();
    params["signature"] = json!(signature);
    params
}

#[tokio::test]
async fn test_gateway_webhook_signatures() {
    let h = harness(idle_provider()).await;

    let (status, body) = h
        .send_json(post_json(
            "/api/v1/webhooks/networx",
            None,
            signed_gateway_body("refunded"),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let mut unsigned = signed_gateway_body("success");
    unsigned.as_object_mut().unwrap().remove("signature");
    let (status, _) = h
        .send(post_json("/api/v1/webhooks/networx", None, unsigned))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut forged = signed_gateway_body("success");
    forged["status"] = json!("failed");
    let (status, _) = h
        .send(post_json("/api/v1/webhooks/networx", None, forged))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/webhooks/networx")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("status=success&order_id=order-1"))
        .unwrap();
    let (status, body) = h.send_json(request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");

    assert_eq!(h.balance("user_1").await, UserBalance::new(30, 100));
}

#[tokio::test]
async fn test_gateway_webhook_liveness() {
    let h = harness(idle_provider()).await;
    let (status, body) = h.send_json(get("/api/v1/webhooks/networx", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Networx webhook endpoint is active");
    assert!(body["timestamp"].is_string());
}

// =============================================================================
// Account, credits, payments, receipts
// =============================================================================

#[tokio::test]
async fn test_credits() {
    let h = harness(idle_provider()).await;

    let (status, body) = h.send_json(get("/api/v1/credits", Some("user_1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"available": 100, "used": 30, "remaining": 70}));

    let (_, body) = h.send_json(get("/api/v1/credits", Some("ghost"))).await;
    assert_eq!(body["remaining"], 0);

    let (status, _) = h.send(get("/api/v1/credits", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_account_lifecycle() {
    let h = harness(idle_provider()).await;

    let (status, body) = h
        .send_json(post_json("/api/v1/account", Some("newbie"), json!({"firstName": "Ada"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "newbie@example.com");
    assert_eq!(body["available_generations"], 20);

    // Provisioning again keeps the counters
    h.ledger.reserve("newbie", 5).await.unwrap();
    let (status, body) = h
        .send_json(post_json("/api/v1/account", Some("newbie"), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used_generations"], 5);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/api/v1/account")
        .header(header::AUTHORIZATION, "Bearer newbie")
        .body(Body::empty())
        .unwrap();
    let (status, _) = h.send(delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.ledger.balance("newbie").await.unwrap().is_none());
}

#[tokio::test]
async fn test_payment_history_is_scoped_to_caller() {
    let h = harness(idle_provider()).await;
    let body = card_body("uid-7", "successful", "user_1", "Nerbixa credits (100 Tokens)");
    h.send(card_webhook(&body, Some(&card_signature(&body)))).await;

    let (status, history) = h
        .send_json(get("/api/v1/payments/history", Some("user_1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["transactions"][0]["processor_uid"], "uid-7");

    let (_, history) = h
        .send_json(get("/api/v1/payments/history", Some("broke")))
        .await;
    assert_eq!(history["transactions"], json!([]));
}

#[tokio::test]
async fn test_payment_token_in_test_mode() {
    let h = harness(idle_provider()).await;

    let (status, body) = h
        .send_json(post_json(
            "/api/v1/payment/networx",
            Some("user_1"),
            json!({"amount": 19.99, "orderId": "order-1"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().unwrap().starts_with("test_"));
    assert_eq!(body["test_mode"], true);

    let (status, body) = h
        .send_json(post_json("/api/v1/payment/networx", Some("user_1"), json!({"amount": 5})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Amount and orderId are required");

    let (status, _) = h
        .send(post_json("/api/v1/payment/networx", None, json!({"amount": 5, "orderId": "o"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_receipt_rendering() {
    let h = harness(idle_provider()).await;

    let (status, bytes) = h
        .send(post_json(
            "/api/v1/receipts",
            Some("user_1"),
            json!({
                "receiptId": "uid-9",
                "email": "user_1@example.com",
                "date": "October 16, 2026",
                "tokens": 500,
                "description": "Nerbixa credits (500 Tokens)",
                "amount": 1999,
                "currency": "USD"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(bytes).unwrap();
    assert!(html.contains("19.99 USD"));
    assert!(html.contains("uid-9"));
}
