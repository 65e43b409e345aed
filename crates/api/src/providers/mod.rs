//! Generation providers
//!
//! Thin HTTP adapters for the external AI services behind the metered tools.
//! Handlers only see the [`GenerationProvider`] trait, so tests can swap in a
//! mock and never reach the network.

pub mod openai;
pub mod replicate;

use std::time::Duration;

use async_trait::async_trait;
use nerbixa_shared::Tool;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;

/// One chat message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Validated input of a metered generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRequest {
    Conversation {
        messages: Vec<ChatMessage>,
    },
    Image {
        prompt: String,
        amount: u32,
        resolution: String,
        model: String,
    },
    StyleTransfer {
        image_url: String,
        prompt: String,
        resolution: String,
    },
    Music {
        prompt: String,
        duration: Option<u32>,
    },
    Speech {
        prompt: String,
    },
    Video {
        prompt: String,
    },
}

impl GenerationRequest {
    pub fn tool(&self) -> Tool {
        match self {
            Self::Conversation { .. } => Tool::Conversation,
            Self::Image { .. } => Tool::Image,
            Self::StyleTransfer { .. } => Tool::StyleTransfer,
            Self::Music { .. } => Tool::Music,
            Self::Speech { .. } => Tool::Speech,
            Self::Video { .. } => Tool::Video,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("Provider request failed: {0}")]
    Http(String),
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Generation failed: {0}")]
    Failed(String),
    #[error("Generation timed out")]
    Timeout,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// Runs a generation and returns the provider's result document
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Value, ProviderError>;
}

/// Routes each tool to the service that implements it
#[derive(Clone)]
pub struct HttpGenerationProvider {
    openai: OpenAiClient,
    replicate: ReplicateClient,
}

impl HttpGenerationProvider {
    pub fn new(openai: OpenAiClient, replicate: ReplicateClient) -> Self {
        Self { openai, replicate }
    }

    /// Build both clients with a shared HTTP client honouring `timeout`
    pub fn from_keys(
        openai_api_key: &str,
        replicate_api_token: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(
            OpenAiClient::new(client.clone(), openai_api_key),
            ReplicateClient::new(client, replicate_api_token, timeout),
        ))
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<Value, ProviderError> {
        match request {
            GenerationRequest::Conversation { messages } => self.openai.chat(&messages).await,
            GenerationRequest::Image {
                prompt,
                amount,
                resolution,
                model,
            } => {
                self.openai
                    .generate_image(&prompt, amount, &resolution, &model, None)
                    .await
            }
            GenerationRequest::StyleTransfer {
                image_url,
                prompt,
                resolution,
            } => {
                let styled = format!(
                    "Transform the provided reference image in the style of {prompt}. \
                     Maintain the original composition and subject matter, but apply the \
                     artistic style transformation. Make it look like {prompt}."
                );
                self.openai
                    .generate_image(&styled, 1, &resolution, "gpt-image-1", Some(&image_url))
                    .await
            }
            GenerationRequest::Music { prompt, duration } => {
                let mut input = serde_json::json!({ "prompt": prompt });
                if let Some(duration) = duration {
                    input["duration"] = duration.into();
                }
                self.replicate.run(replicate::MUSIC_MODEL, input).await
            }
            GenerationRequest::Speech { prompt } => {
                self.replicate
                    .run(replicate::SPEECH_MODEL, serde_json::json!({ "text": prompt }))
                    .await
            }
            GenerationRequest::Video { prompt } => {
                self.replicate
                    .run(
                        replicate::VIDEO_MODEL,
                        serde_json::json!({ "prompt": prompt, "prompt_optimizer": true }),
                    )
                    .await
            }
        }
    }
}
