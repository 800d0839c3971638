use folio_core::{ChannelSet, RetryPolicy};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub channels: ChannelSet,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    pub notification: NotificationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Lifetime of consumer dedup markers; well beyond the broker's redelivery window.
    #[serde(default = "default_marker_ttl_secs")]
    pub marker_ttl_secs: u64,
}

fn default_marker_ttl_secs() -> u64 { 7 * 24 * 60 * 60 }

impl RedisConfig {
    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.marker_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_group_prefix")]
    pub group_prefix: String,
}

fn default_group_prefix() -> String { "folio".to_string() }

/// Upper bounds, in milliseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    pub store_write_ms: u64,
    pub publish_ms: u64,
    pub notification_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_write_ms: 3_000,
            publish_ms: 5_000,
            notification_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn store_write(&self) -> Duration {
        Duration::from_millis(self.store_write_ms)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_millis(self.publish_ms)
    }

    pub fn notification(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub endpoint: String,
    pub group_id: String,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    pub shipping_method: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { shipping_method: "USPS".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub seed_on_start: bool,
    pub initial_stock: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            seed_on_start: true,
            initial_stock: 98,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// Pause before resubscribing after a stream ends or fails.
    pub reconnect_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_delay_ms: 2_000,
        }
    }
}

impl WorkerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `FOLIO__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("FOLIO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let raw = r#"
            [server]
            port = 8080

            [database]
            url = "postgres://localhost/bookstore"

            [redis]
            url = "redis://localhost:6379"

            [kafka]
            brokers = "localhost:9092"

            [notification]
            endpoint = "http://localhost:9000/notify"
            group_id = "K4q!6D2f#8"
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.channels, ChannelSet::default());
        assert_eq!(config.kafka.group_prefix, "folio");
        assert_eq!(config.timeouts.store_write(), Duration::from_secs(3));
        assert_eq!(config.notification.retry, RetryPolicy::default());
        assert_eq!(config.dispatch.shipping_method, "USPS");
        assert_eq!(config.catalog.initial_stock, 98);
        assert!(config.workers.enabled);
        assert_eq!(config.redis.marker_ttl(), Duration::from_secs(604_800));
    }
}
