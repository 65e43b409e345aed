//! Payment routes: gateway checkout tokens, status lookups and history

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use nerbixa_billing::{StatusQuery, StatusResponse, TokenRequest, TokenResponse};
use nerbixa_shared::PaymentTransaction;
use serde::Serialize;

use crate::{auth::AuthUser, error::ApiResult, extract::JsonBody, state::AppState};

/// POST /api/v1/payment/networx
pub async fn create_payment_token(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(mut request): JsonBody<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    if request.customer_email.is_none() {
        request.customer_email = user.email.clone();
    }

    tracing::info!(
        clerk_id = %user.clerk_id,
        order_id = ?request.order_id,
        amount = ?request.amount,
        "Creating gateway payment token"
    );

    let token = state.billing.checkout.create_token(request).await?;
    Ok(Json(token))
}

/// GET /api/v1/payment/networx?token=&orderId=
pub async fn payment_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    tracing::debug!(clerk_id = %user.clerk_id, order_id = ?query.order_id, "Gateway status lookup");
    let status = state.billing.checkout.check_status(query).await?;
    Ok(Json(status))
}

#[derive(Debug, Serialize)]
pub struct PaymentHistoryResponse {
    pub transactions: Vec<PaymentTransaction>,
}

/// GET /api/v1/payments/history
pub async fn payment_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<PaymentHistoryResponse>> {
    let transactions = state.billing.ledger.transactions(&user.clerk_id).await?;
    Ok(Json(PaymentHistoryResponse { transactions }))
}
