//! Email notifications for billing events
//!
//! Sends payment receipts via the Resend API. Delivery is best-effort: a
//! failed send is logged and reported as `Ok(false)`, never as an error that
//! would fail an already committed payment.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::BillingResult;
use crate::receipt::{render_html, ReceiptData};

const RESEND_API_URL: &str = "https://api.resend.com";

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// Support email, used as reply-to
    pub support_email: String,
    /// API base URL, overridable for tests
    pub api_url: String,
}

impl EmailConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Nerbixa <noreply@nerbixa.com>".to_string()),
            support_email: std::env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@nerbixa.com".to_string()),
            api_url: RESEND_API_URL.to_string(),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Delivery of rendered receipts
#[async_trait]
pub trait ReceiptMailer: Send + Sync {
    /// Returns `Ok(true)` when the receipt was handed to the mail provider
    async fn send_receipt(&self, to: &str, receipt: &ReceiptData) -> BillingResult<bool>;
}

/// Billing email notification service
#[derive(Clone)]
pub struct BillingEmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl BillingEmailService {
    /// Create a new email service
    pub fn new(config: EmailConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Send an email via Resend API
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        attachment: Option<(&str, &str)>,
    ) -> BillingResult<bool> {
        if !self.config.is_enabled() {
            tracing::warn!(
                to = %to,
                subject = %subject,
                "Email not configured, skipping"
            );
            return Ok(false);
        }

        let mut body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "reply_to": self.config.support_email,
            "subject": subject,
            "html": html
        });
        if let Some((filename, content)) = attachment {
            body["attachments"] = serde_json::json!([{
                "filename": filename,
                "content": BASE64.encode(content.as_bytes()),
            }]);
        }

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_url))
            .bearer_auth(&self.config.resend_api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Billing email sent");
                Ok(true)
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    status = %status,
                    body = %body,
                    "Failed to send billing email - non-fatal"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    error = %e,
                    "Failed to send billing email - non-fatal"
                );
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl ReceiptMailer for BillingEmailService {
    async fn send_receipt(&self, to: &str, receipt: &ReceiptData) -> BillingResult<bool> {
        let html = render_html(receipt);
        let file_name = receipt.file_name();
        self.send_email(to, &receipt.subject(), &html, Some((&file_name, &html)))
            .await
    }
}

#[cfg(any(test, feature = "testing"))]
pub use recording::RecordingMailer;

#[cfg(any(test, feature = "testing"))]
mod recording {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::error::BillingError;

    /// Mailer that keeps every receipt it is asked to send
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<(String, ReceiptData)>>,
        fail: AtomicBool,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every following send return an error
        pub fn fail_sends(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        pub async fn sent(&self) -> Vec<(String, ReceiptData)> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl ReceiptMailer for RecordingMailer {
        async fn send_receipt(&self, to: &str, receipt: &ReceiptData) -> BillingResult<bool> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BillingError::Internal("mail provider unavailable".to_string()));
            }
            self.sent
                .lock()
                .await
                .push((to.to_string(), receipt.clone()));
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> ReceiptData {
        ReceiptData {
            receipt_id: "uid-1".to_string(),
            email: "a@example.com".to_string(),
            date: "October 16, 2026".to_string(),
            tokens: 500,
            description: "Credits (500 Tokens)".to_string(),
            amount: 1999,
            currency: "USD".to_string(),
        }
    }

    fn config(api_url: String, key: &str) -> EmailConfig {
        EmailConfig {
            resend_api_key: key.to_string(),
            email_from: "Nerbixa <noreply@nerbixa.com>".to_string(),
            support_email: "support@nerbixa.com".to_string(),
            api_url,
        }
    }

    #[tokio::test]
    async fn test_send_receipt_posts_inline_and_attachment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::PartialJsonString(
                    r#"{"to":["a@example.com"],"subject":"Your Nerbixa receipt #uid-1"}"#
                        .to_string(),
                ),
                mockito::Matcher::Regex("receipt-uid-1.html".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"email_1"}"#)
            .create_async()
            .await;

        let service = BillingEmailService::new(config(server.url(), "re_test"), reqwest::Client::new());
        let sent = service.send_receipt("a@example.com", &receipt()).await.unwrap();

        assert!(sent);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_failure_is_non_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/emails")
            .with_status(500)
            .create_async()
            .await;

        let service = BillingEmailService::new(config(server.url(), "re_test"), reqwest::Client::new());
        let sent = service.send_receipt("a@example.com", &receipt()).await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_disabled_without_api_key() {
        let service = BillingEmailService::new(config("http://127.0.0.1:9".to_string(), ""), reqwest::Client::new());
        assert!(!service.send_receipt("a@example.com", &receipt()).await.unwrap());
    }

    #[tokio::test]
    async fn test_recording_mailer() {
        let mailer = RecordingMailer::new();
        mailer.send_receipt("a@example.com", &receipt()).await.unwrap();
        assert_eq!(mailer.sent().await.len(), 1);

        mailer.fail_sends();
        assert!(mailer.send_receipt("a@example.com", &receipt()).await.is_err());
    }
}
