//! Customer notification: enrich the order event with the group identifier and
//! hand it to the external notification service, once per order.

use async_trait::async_trait;
use folio_core::dedup::dedup_key;
use folio_core::{retry_with_backoff, DedupStore, EventHandler, FolioError, FolioResult, HandleOutcome, RetryPolicy};
use folio_shared::{Customer, LineItem, OrderEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CONSUMER_NAME: &str = "notification";

/// How long a sent-notification marker is kept by default.
pub const DEFAULT_MARKER_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Body sent to the notification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "orderID")]
    pub order_id: Uuid,
    #[serde(rename = "groupID")]
    pub group_id: String,
    pub products: Vec<LineItem>,
    pub customer: Customer,
}

impl NotificationPayload {
    pub fn enrich(event: &OrderEvent, group_id: &str) -> Self {
        Self {
            order_id: event.order_id,
            group_id: group_id.to_string(),
            products: event.line_items.clone(),
            customer: event.customer.clone(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("notification service answered {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("notification call timed out after {0}ms")]
    Timeout(u64),
}

impl NotifyError {
    /// Client errors are final except request timeout and rate limiting.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Rejected { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            NotifyError::Transport(_) | NotifyError::Timeout(_) => true,
        }
    }
}

/// Outbound call to the notification service. Any 2xx answer is a success.
#[async_trait]
pub trait NotificationClient: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}

pub struct NotificationHandler {
    client: Arc<dyn NotificationClient>,
    dedup: Arc<dyn DedupStore>,
    group_id: String,
    retry: RetryPolicy,
    call_timeout: Duration,
    retention: Duration,
}

impl NotificationHandler {
    pub fn new(
        client: Arc<dyn NotificationClient>,
        dedup: Arc<dyn DedupStore>,
        group_id: impl Into<String>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            dedup,
            group_id: group_id.into(),
            retry,
            call_timeout,
            retention: DEFAULT_MARKER_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// A claim outlives the whole retry run, so only a dead worker lets it lapse.
    fn claim_ttl(&self) -> Duration {
        self.retry.worst_case(self.call_timeout) * 2
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let timeout_ms = self.call_timeout.as_millis() as u64;
        retry_with_backoff(
            &self.retry,
            |attempt| async move {
                if attempt > 1 {
                    info!("Retrying notification for order {} (attempt {})", payload.order_id, attempt);
                }
                match tokio::time::timeout(self.call_timeout, self.client.send(payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(NotifyError::Timeout(timeout_ms)),
                }
            },
            NotifyError::is_retryable,
        )
        .await
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &str {
        CONSUMER_NAME
    }

    async fn handle(&self, event: &OrderEvent) -> FolioResult<HandleOutcome> {
        let key = dedup_key(CONSUMER_NAME, event.order_id);

        let claimed = self
            .dedup
            .claim(&key, self.claim_ttl())
            .await
            .map_err(|e| FolioError::consumer(CONSUMER_NAME, event.order_id, e.to_string()))?;
        if !claimed {
            info!("Notification for order {} already sent, ignoring redelivery", event.order_id);
            return Ok(HandleOutcome::Duplicate);
        }

        let payload = NotificationPayload::enrich(event, &self.group_id);
        match self.deliver(&payload).await {
            Ok(()) => {
                info!("Notification sent for order {} to {}", event.order_id, event.customer.email);
                if let Err(e) = self.dedup.confirm(&key, self.retention).await {
                    warn!("Could not confirm notification marker for order {}: {}", event.order_id, e);
                }
                Ok(HandleOutcome::Applied)
            }
            Err(e) => {
                error!("Notification for order {} failed: {}", event.order_id, e);
                if let Err(release_err) = self.dedup.release(&key).await {
                    warn!("Could not release notification claim for order {}: {}", event.order_id, release_err);
                }
                Err(FolioError::consumer(CONSUMER_NAME, event.order_id, e.to_string()))
            }
        }
    }
}

/// Client double that records every payload and can be scripted to fail.
#[derive(Default)]
pub struct RecordingNotificationClient {
    sent: Mutex<Vec<NotificationPayload>>,
    attempts: Mutex<u32>,
    scripted_failures: Mutex<Vec<NotifyError>>,
}

impl RecordingNotificationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues errors returned, in order, by the next calls.
    pub async fn fail_next(&self, errors: Vec<NotifyError>) {
        let mut scripted = self.scripted_failures.lock().await;
        scripted.extend(errors);
    }

    pub async fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().await.clone()
    }

    pub async fn attempts(&self) -> u32 {
        *self.attempts.lock().await
    }
}

#[async_trait]
impl NotificationClient for RecordingNotificationClient {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        *self.attempts.lock().await += 1;

        let mut scripted = self.scripted_failures.lock().await;
        if !scripted.is_empty() {
            return Err(scripted.remove(0));
        }
        drop(scripted);

        self.sent.lock().await.push(payload.clone());
        Ok(())
    }
}
