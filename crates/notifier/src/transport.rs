//! Mail transports: the black box behind `send(to, subject, body)`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Default Resend emails endpoint.
const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Errors a transport can report for a single send.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected email with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A channel capable of delivering one email.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver a plain-text email. `Ok(())` means the transport accepted it.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError>;

    /// Human-readable name for logs (e.g., "resend").
    fn name(&self) -> &'static str;
}

/// Transport that waits a fixed delay and logs the email instead of sending it.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    delay: Duration,
}

impl SimulatedTransport {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl MailTransport for SimulatedTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        // Simulated network delay
        tokio::time::sleep(self.delay).await;

        tracing::info!(to, subject, body, "=== EMAIL SIMULATION ===");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Request body for the Resend emails API.
#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Transport backed by the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendTransport {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl ResendTransport {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
            endpoint: RESEND_API_URL.to_string(),
        }
    }

    /// Override the API endpoint (self-hosted relays, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body<'a>(&'a self, to: &'a str, subject: &'a str, body: &'a str) -> ResendEmail<'a> {
        ResendEmail {
            from: &self.from,
            to: [to],
            subject,
            text: body,
        }
    }
}

#[async_trait]
impl MailTransport for ResendTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(to, subject, body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to, status = status.as_u16(), "Resend accepted email");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}
