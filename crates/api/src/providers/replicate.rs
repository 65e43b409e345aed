//! Replicate adapter (music, speech and video models)
//!
//! Predictions are created with `Prefer: wait` so short runs finish in a single
//! round trip; anything still running afterwards is polled until it settles or
//! the configured timeout passes.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};

use super::ProviderError;

const REPLICATE_API_URL: &str = "https://api.replicate.com/v1";
const POLL_INTERVAL: Duration = Duration::from_millis(1000);

pub const MUSIC_MODEL: &str =
    "meta/musicgen:671ac645ce5e552cc63a54a2bbff63fcf798043055d2dac5fc9e36a837eedcfb";
pub const SPEECH_MODEL: &str =
    "adirik/styletts2:989cb5ea6d2401314eb30685740cb9f6fd1c9001b8940659b406f952837ab5ac";
pub const VIDEO_MODEL: &str = "minimax/video-01";

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

impl Prediction {
    fn is_settled(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

#[derive(Clone)]
pub struct ReplicateClient {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
    timeout: Duration,
}

impl ReplicateClient {
    pub fn new(client: reqwest::Client, api_token: &str, timeout: Duration) -> Self {
        Self {
            client,
            api_token: api_token.to_string(),
            base_url: REPLICATE_API_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run `model` (`owner/name` or `owner/name:version`) and return its output
    pub async fn run(&self, model: &str, input: Value) -> Result<Value, ProviderError> {
        if self.api_token.is_empty() {
            return Err(ProviderError::NotConfigured("REPLICATE_API_TOKEN"));
        }

        let (url, body) = match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.base_url),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.base_url, model),
                json!({ "input": input }),
            ),
        };

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let mut prediction = Self::parse(response).await?;

        while !prediction.is_settled() {
            if started.elapsed() >= self.timeout {
                tracing::warn!(model = %model, prediction_id = %prediction.id, "Prediction did not settle in time");
                return Err(ProviderError::Timeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self
                .client
                .get(format!("{}/predictions/{}", self.base_url, prediction.id))
                .bearer_auth(&self.api_token)
                .send()
                .await?;
            prediction = Self::parse(response).await?;
        }

        match prediction.status.as_str() {
            "succeeded" => Ok(prediction.output),
            status => Err(ProviderError::Failed(format!(
                "prediction {} {}: {}",
                prediction.id, status, prediction.error
            ))),
        }
    }

    async fn parse(response: reqwest::Response) -> Result<Prediction, ProviderError> {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: String) -> ReplicateClient {
        ReplicateClient::new(reqwest::Client::new(), "r8_test", Duration::from_secs(5))
            .with_base_url(url)
    }

    #[tokio::test]
    async fn test_versioned_model_waits_inline() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/predictions")
            .match_header("prefer", "wait")
            .match_header("authorization", "Bearer r8_test")
            .match_body(Matcher::PartialJsonString(
                r#"{"version":"671ac645ce5e552cc63a54a2bbff63fcf798043055d2dac5fc9e36a837eedcfb","input":{"prompt":"lofi","duration":8}}"#
                    .to_string(),
            ))
            .with_status(201)
            .with_body(r#"{"id":"p1","status":"succeeded","output":"https://out/a.wav"}"#)
            .create_async()
            .await;

        let output = client(server.url())
            .run(MUSIC_MODEL, json!({"prompt": "lofi", "duration": 8}))
            .await
            .unwrap();
        assert_eq!(output, json!("https://out/a.wav"));
    }

    #[tokio::test]
    async fn test_model_endpoint_polls_until_done() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/models/minimax/video-01/predictions")
            .with_status(201)
            .with_body(r#"{"id":"p2","status":"processing"}"#)
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/predictions/p2")
            .with_status(200)
            .with_body(r#"{"id":"p2","status":"succeeded","output":"https://out/v.mp4"}"#)
            .create_async()
            .await;

        let output = client(server.url())
            .run(VIDEO_MODEL, json!({"prompt": "waves"}))
            .await
            .unwrap();
        assert_eq!(output, json!("https://out/v.mp4"));
    }

    #[tokio::test]
    async fn test_failed_prediction() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/predictions")
            .with_status(201)
            .with_body(r#"{"id":"p3","status":"failed","error":"NSFW"}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .run(SPEECH_MODEL, json!({"text": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Failed(_)));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let client = ReplicateClient::new(reqwest::Client::new(), "", Duration::from_secs(1));
        assert!(matches!(
            client.run(VIDEO_MODEL, json!({})).await,
            Err(ProviderError::NotConfigured("REPLICATE_API_TOKEN"))
        ));
    }
}
