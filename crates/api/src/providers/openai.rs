//! OpenAI adapter (chat completions and image generation)

use serde_json::{json, Value};

use super::{ChatMessage, ProviderError};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const CHAT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured("OPENAI_API_KEY"));
        }

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Reply message of a chat completion
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<Value, ProviderError> {
        let response = self
            .post(
                "/chat/completions",
                &json!({ "model": CHAT_MODEL, "messages": messages }),
            )
            .await?;

        response
            .pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| ProviderError::Failed("completion without choices".to_string()))
    }

    /// Generated image descriptors (`data` array)
    pub async fn generate_image(
        &self,
        prompt: &str,
        amount: u32,
        resolution: &str,
        model: &str,
        reference_image: Option<&str>,
    ) -> Result<Value, ProviderError> {
        let mut body = json!({
            "prompt": prompt,
            "n": amount,
            "size": resolution,
            "model": model,
        });
        if let Some(url) = reference_image {
            body["reference_images"] = json!([url]);
        }

        let response = self.post("/images/generations", &body).await?;
        response
            .get("data")
            .cloned()
            .ok_or_else(|| ProviderError::Failed("image response without data".to_string()))
    }
}
