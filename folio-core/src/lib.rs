pub mod broker;
pub mod dedup;
pub mod handler;
pub mod retry;

use std::future::Future;
use std::time::Duration;

pub use broker::{BrokerError, ChannelSet, Delivery, Envelope, EnvelopeStream, EventBroker, InMemoryBroker};
pub use dedup::{DedupStore, InMemoryDedup};
pub use handler::{EventHandler, HandleOutcome};
pub use retry::{retry_with_backoff, RetryPolicy};

/// Failure kinds of the ingestion pipeline.
///
/// Only `ValidationError`, `StorageError` and `Timeout` ever reach the caller of
/// `CreateOrder`; the rest are reported by the consumers and the fan-out.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Publish to '{channel}' failed: {reason}")]
    PublishError { channel: String, reason: String },
    #[error("Consumer '{consumer}' could not process order {order_id}: {reason}")]
    ConsumerProcessingError {
        consumer: String,
        order_id: String,
        reason: String,
    },
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type FolioResult<T> = Result<T, FolioError>;

/// Errors raised by the order, inventory and dedup stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Record already exists: {0}")]
    Conflict(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for FolioError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => FolioError::NotFound(what),
            other => FolioError::StorageError(other.to_string()),
        }
    }
}

impl From<BrokerError> for FolioError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::PublishFailed { channel, reason } => FolioError::PublishError { channel, reason },
            other => FolioError::PublishError {
                channel: String::from("unknown"),
                reason: other.to_string(),
            },
        }
    }
}

impl FolioError {
    pub fn consumer(consumer: &str, order_id: impl ToString, reason: impl Into<String>) -> Self {
        FolioError::ConsumerProcessingError {
            consumer: consumer.to_string(),
            order_id: order_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FolioError::Timeout { .. })
    }
}

/// Runs `fut` with an upper bound, surfacing expiry as [`FolioError::Timeout`].
pub async fn with_deadline<T, E, F>(operation: &str, limit: Duration, fut: F) -> FolioResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<FolioError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(FolioError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}
