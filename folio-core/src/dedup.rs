use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::StoreError;

/// Persisted markers that make a consumer side effect happen once per order.
///
/// A claim is pending until confirmed and lapses after its TTL, so a worker
/// that dies mid-way does not block later redeliveries for good.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Returns `true` when the caller now owns `key` for `ttl`, `false` when a
    /// live claim or confirmation already exists.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Records that the side effect happened; the marker is kept for `retention`.
    async fn confirm(&self, key: &str, retention: Duration) -> Result<(), StoreError>;

    /// Gives a claim back so a later redelivery can retry the side effect.
    async fn release(&self, key: &str) -> Result<(), StoreError>;
}

pub fn dedup_key(consumer: &str, order_id: Uuid) -> String {
    format!("processed:{}:{}", consumer, order_id)
}

#[derive(Default)]
pub struct InMemoryDedup {
    keys: Mutex<HashMap<String, Instant>>,
}

impl InMemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.keys
            .lock()
            .await
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now())
    }
}

#[async_trait]
impl DedupStore for InMemoryDedup {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut keys = self.keys.lock().await;
        if keys.get(key).is_some_and(|expires_at| *expires_at > now) {
            return Ok(false);
        }
        keys.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn confirm(&self, key: &str, retention: Duration) -> Result<(), StoreError> {
        self.keys.lock().await.insert(key.to_string(), Instant::now() + retention);
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        self.keys.lock().await.remove(key);
        Ok(())
    }
}
