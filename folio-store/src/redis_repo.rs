use async_trait::async_trait;
use folio_catalog::{DecrementOutcome, InventoryRepository};
use folio_core::{DedupStore, StoreError};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

// KEYS[1] stock, KEYS[2] applied marker, ARGV[1] quantity, ARGV[2] marker TTL in seconds.
// Returns {0, 0} unknown product, {1, 0} already applied, {2, stock} decremented.
const DECREMENT_ONCE_SCRIPT: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return {0, 0}
    end
    if not redis.call("SET", KEYS[2], "1", "NX", "EX", ARGV[2]) then
        return {1, 0}
    end
    return {2, redis.call("DECRBY", KEYS[1], ARGV[1])}
"#;

fn stock_key(title: &str) -> String {
    format!("inventory:{}", title)
}

fn applied_key(order_id: Uuid, title: &str) -> String {
    format!("inventory:applied:{}:{}", order_id, title)
}

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        // Fail at start-up rather than on the first event.
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to Redis");
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)
    }
}

fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Stock counters in Redis, keyed by title. Applied markers expire after
/// `marker_ttl`, which must exceed the broker's redelivery window.
#[derive(Clone)]
pub struct RedisInventory {
    redis: RedisClient,
    decrement_once: redis::Script,
    marker_ttl: Duration,
}

impl RedisInventory {
    pub fn new(redis: RedisClient, marker_ttl: Duration) -> Self {
        Self {
            redis,
            decrement_once: redis::Script::new(DECREMENT_ONCE_SCRIPT),
            marker_ttl,
        }
    }
}

#[async_trait]
impl InventoryRepository for RedisInventory {
    async fn decrement_once(
        &self,
        order_id: Uuid,
        title: &str,
        quantity: u32,
    ) -> Result<DecrementOutcome, StoreError> {
        let mut conn = self.redis.connection().await?;
        let (status, stock): (i64, i64) = self
            .decrement_once
            .key(stock_key(title))
            .key(applied_key(order_id, title))
            .arg(quantity)
            .arg(self.marker_ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        match status {
            0 => Ok(DecrementOutcome::UnknownProduct),
            1 => Ok(DecrementOutcome::Duplicate),
            2 => Ok(DecrementOutcome::Applied(stock)),
            other => Err(StoreError::Corrupt(format!("unexpected decrement status {}", other))),
        }
    }

    async fn quantity_on_hand(&self, title: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.redis.connection().await?;
        conn.get(stock_key(title)).await.map_err(unavailable)
    }

    async fn stock_if_absent(&self, title: &str, quantity: i64) -> Result<bool, StoreError> {
        let mut conn = self.redis.connection().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(stock_key(title))
            .arg(quantity)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(result.is_some())
    }
}

/// Consumer dedup markers as plain Redis keys.
#[derive(Clone)]
pub struct RedisDedup {
    redis: RedisClient,
}

impl RedisDedup {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl DedupStore for RedisDedup {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.redis.connection().await?;
        // SET NX PX: only set if key does not exist, and let a stale claim lapse
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("pending")
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        debug!("Dedup claim {} -> {}", key, result.is_some());
        Ok(result.is_some())
    }

    async fn confirm(&self, key: &str, retention: Duration) -> Result<(), StoreError> {
        let mut conn = self.redis.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg("done")
            .arg("PX")
            .arg(millis(retention))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.connection().await?;
        conn.del::<_, ()>(key).await.map_err(unavailable)
    }
}
