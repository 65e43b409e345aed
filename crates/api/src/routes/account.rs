//! Account and credit balance routes

use axum::{extract::State, http::StatusCode, Extension, Json};
use nerbixa_shared::{NewAccount, UserAccount};
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    extract::JsonBody,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub available: i32,
    pub used: i32,
    pub remaining: i32,
}

/// GET /api/v1/credits
///
/// Users without an account yet see an empty balance.
pub async fn get_credits(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CreditsResponse>> {
    let balance = state.billing.ledger.balance(&user.clerk_id).await?;

    Ok(Json(match balance {
        Some(balance) => CreditsResponse {
            available: balance.available_generations,
            used: balance.used_generations,
            remaining: balance.remaining(),
        },
        None => CreditsResponse {
            available: 0,
            used: 0,
            remaining: 0,
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionAccountRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

/// POST /api/v1/account
///
/// Idempotent: a second call refreshes the profile and keeps the counters.
pub async fn provision_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(request): JsonBody<ProvisionAccountRequest>,
) -> ApiResult<Json<UserAccount>> {
    let email = request
        .email
        .filter(|e| !e.trim().is_empty())
        .or(user.email.clone())
        .ok_or_else(|| ApiError::Validation("Email is required".to_string()))?;

    let account = state
        .billing
        .ledger
        .provision(
            &user.clerk_id,
            NewAccount {
                email,
                first_name: request.first_name,
                last_name: request.last_name,
                photo: request.photo,
            },
        )
        .await?;

    tracing::info!(clerk_id = %user.clerk_id, "Account provisioned");
    Ok(Json(account))
}

/// DELETE /api/v1/account
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<StatusCode> {
    if !state.billing.ledger.delete_account(&user.clerk_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(clerk_id = %user.clerk_id, "Account deleted");
    Ok(StatusCode::NO_CONTENT)
}
