use async_trait::async_trait;
use folio_order::{NotificationClient, NotificationPayload, NotifyError};
use std::time::Duration;
use tracing::debug;

/// Posts notification payloads as JSON to the external endpoint.
#[derive(Clone)]
pub struct HttpNotificationClient {
    http: reqwest::Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpNotificationClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

#[async_trait]
impl NotificationClient for HttpNotificationClient {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout_ms)
                } else {
                    NotifyError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Notification endpoint accepted order {} ({})", payload.order_id, status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
