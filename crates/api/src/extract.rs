//! Request extractors

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body whose rejections answer with the API error envelope.
///
/// A missing content type, malformed JSON or a field of the wrong type is a
/// validation error (400) rather than axum's plain-text 415/422.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
                Err(ApiError::Validation(rejection.body_text()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct PromptBody {
        prompt: String,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_body() {
        let JsonBody(body) =
            JsonBody::<PromptBody>::from_request(request(Some("application/json"), r#"{"prompt":"cat"}"#), &())
                .await
                .unwrap();
        assert_eq!(body.prompt, "cat");
    }

    #[tokio::test]
    async fn test_rejections_are_validation_errors() {
        for req in [
            request(None, r#"{"prompt":"cat"}"#),
            request(Some("application/json"), r#"{"prompt":5}"#),
            request(Some("application/json"), "{not json"),
        ] {
            let err = JsonBody::<PromptBody>::from_request(req, &()).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
    }
}
