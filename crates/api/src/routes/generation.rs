//! Metered generation routes
//!
//! Every tool follows the same sequence: validate the body, reserve the tool's
//! price against the caller's balance, call the provider and hand the credits
//! back if the provider fails.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    extract::JsonBody,
    providers::{ChatMessage, GenerationRequest},
    state::AppState,
};

const DEFAULT_RESOLUTION: &str = "1024x1024";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

#[derive(Debug, Deserialize)]
pub struct ConversationBody {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct ImageBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleTransferBody {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MusicBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub duration: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    #[serde(default)]
    pub prompt: Option<String>,
}

fn required(value: Option<String>, message: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(message.to_string()))
}

/// Positive integer given as a JSON number or a numeric string
fn positive_int(value: &Value) -> Option<u32> {
    let parsed: Option<u32> = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| *n > 0)
}

/// Reserve credits, run the generation and settle the reservation
async fn run_metered(
    state: &AppState,
    user: &AuthUser,
    request: GenerationRequest,
) -> ApiResult<Json<Value>> {
    let tool = request.tool();
    let usage = &state.billing.usage;

    let reservation = usage.reserve(&user.clerk_id, tool).await?;

    match state.provider.generate(request).await {
        Ok(output) => {
            tracing::info!(
                clerk_id = %user.clerk_id,
                tool = %tool,
                price = reservation.price,
                "Generation completed"
            );
            Ok(Json(output))
        }
        Err(e) => {
            tracing::error!(clerk_id = %user.clerk_id, tool = %tool, error = %e, "Generation failed");
            if let Err(release_err) = usage.release(reservation).await {
                tracing::error!(
                    clerk_id = %user.clerk_id,
                    tool = %tool,
                    error = %release_err,
                    "Failed to release credits after a failed generation"
                );
            }
            Err(ApiError::Upstream(e.to_string()))
        }
    }
}

/// POST /api/v1/conversation
pub async fn conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<ConversationBody>,
) -> ApiResult<Json<Value>> {
    let messages = body
        .messages
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::Validation("Messages are required".to_string()))?;

    run_metered(&state, &user, GenerationRequest::Conversation { messages }).await
}

/// POST /api/v1/image
pub async fn image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<ImageBody>,
) -> ApiResult<Json<Value>> {
    let prompt = required(body.prompt, "Prompt is required")?;
    let amount = match &body.amount {
        None => 1,
        Some(value) => positive_int(value)
            .ok_or_else(|| ApiError::Validation("Amount is required".to_string()))?,
    };
    let resolution = match body.resolution {
        None => DEFAULT_RESOLUTION.to_string(),
        Some(r) => required(Some(r), "Resolution is required")?,
    };
    let model = body
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());

    run_metered(
        &state,
        &user,
        GenerationRequest::Image {
            prompt,
            amount,
            resolution,
            model,
        },
    )
    .await
}

/// POST /api/v1/style-transfer
pub async fn style_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<StyleTransferBody>,
) -> ApiResult<Json<Value>> {
    let prompt = required(body.prompt, "Prompt is required")?;
    let image_url = required(body.image_url, "Image URL is required")?;
    let resolution = body
        .resolution
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string());

    run_metered(
        &state,
        &user,
        GenerationRequest::StyleTransfer {
            image_url,
            prompt,
            resolution,
        },
    )
    .await
}

/// POST /api/v1/music
pub async fn music(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<MusicBody>,
) -> ApiResult<Json<Value>> {
    let prompt = required(body.prompt, "Prompt is required")?;
    let duration = body.duration.as_ref().and_then(positive_int);

    run_metered(&state, &user, GenerationRequest::Music { prompt, duration }).await
}

/// POST /api/v1/speech
pub async fn speech(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<PromptBody>,
) -> ApiResult<Json<Value>> {
    let prompt = required(body.prompt, "Prompt is required")?;
    run_metered(&state, &user, GenerationRequest::Speech { prompt }).await
}

/// POST /api/v1/video
pub async fn video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<PromptBody>,
) -> ApiResult<Json<Value>> {
    let prompt = required(body.prompt, "Prompt is required")?;
    run_metered(&state, &user, GenerationRequest::Video { prompt }).await
}
