pub mod app_config;
pub mod database;
pub mod order_repo;
pub mod redis_repo;
pub mod events;
pub mod notifier;

pub use app_config::Config;
pub use database::DbClient;
pub use order_repo::PostgresOrderRepository;
pub use redis_repo::{RedisClient, RedisDedup, RedisInventory};
pub use events::KafkaBroker;
pub use notifier::HttpNotificationClient;
