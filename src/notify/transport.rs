//! Outbound transports used by the dispatcher

use async_trait::async_trait;
use std::time::Duration;

/// Transport-level failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    /// The request can never succeed as built (bad URL, bad address)
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::Rejected(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// JSON POST transport for webhook and Slack deliveries
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `payload` to `url`; returns the response status code
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// Email transport
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}

/// HTTP transport backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
}

impl ReqwestHttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}

/// Email transport that only logs.
///
/// Used when no mail relay is configured for the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        tracing::info!(
            to = %to,
            subject = %subject,
            body_len = body.len(),
            "Email notification (no mail relay configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Connect("refused".into()).is_retryable());
        assert!(TransportError::Other("reset".into()).is_retryable());
        assert!(!TransportError::Rejected("bad url".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_log_email_transport_succeeds() {
        let result = LogEmailTransport
            .send("ops@example.com", "subject", "body")
            .await;
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_reqwest_rejects_invalid_url() {
        let transport = ReqwestHttpTransport::new();
        let result = transport
            .post("not a url", &serde_json::json!({}), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(TransportError::Rejected(_))));
    }
}
