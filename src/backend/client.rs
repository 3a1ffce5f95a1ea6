//! Backend Client - HTTP calls to the line backend
//!
//! Test triggers, alert acknowledgment and notification delivery. No request
//! timeout is configured; callers decide whether to wait.

use crate::types::NotificationPayload;

/// Backend client errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Backend returned status {0}")]
    ServerError(reqwest::StatusCode),
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the backend to push a synthetic sensor reading through the hub.
    pub async fn trigger_test_reading(&self) -> Result<(), BackendError> {
        self.post_empty("/test/sensor-data").await
    }

    /// Ask the backend to push a synthetic anomaly alert through the hub.
    pub async fn trigger_test_anomaly(&self) -> Result<(), BackendError> {
        self.post_empty("/test/anomaly-alert").await
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<(), BackendError> {
        self.post_empty(&format!("/alerts/{alert_id}/acknowledge")).await
    }

    pub async fn send_notification(&self, payload: &NotificationPayload) -> Result<(), BackendError> {
        let resp = self
            .http
            .post(format!("{}/notification/send-email", self.base_url))
            .json(payload)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::ServerError(resp.status()))
        }
    }

    async fn post_empty(&self, path: &str) -> Result<(), BackendError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::ServerError(resp.status()))
        }
    }

    /// Base URL for logging
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = BackendClient::new("http://localhost:5005/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5005");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_http_error() {
        // Port 9 (discard) is not listening on loopback in test environments
        let client = BackendClient::new("http://127.0.0.1:9").unwrap();
        let err = client.trigger_test_reading().await.unwrap_err();
        assert!(matches!(err, BackendError::Http(_)));
    }
}
