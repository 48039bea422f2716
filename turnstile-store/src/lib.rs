pub mod app_config;
pub mod database;
pub mod kafka;
pub mod ledger_repo;
pub mod redis_cache;
pub mod redis_notify;

pub use app_config::Config;
pub use database::DbClient;
pub use kafka::{KafkaIntentConsumer, KafkaIntentProducer};
pub use ledger_repo::StoreLedger;
pub use redis_cache::RedisInventoryCache;
pub use redis_notify::{NotificationSubscriber, RedisNotificationRelay};
