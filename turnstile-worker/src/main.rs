use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnstile_booking::SettlementWorker;
use turnstile_core::{Ledger, NotificationRelay};
use turnstile_store::{Config, DbClient, KafkaIntentConsumer, RedisNotificationRelay, StoreLedger};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "turnstile_worker=debug,turnstile_booking=debug,turnstile_store=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!(
        "Starting settlement worker on {} as group {}",
        config.kafka.topic,
        config.kafka.group_id
    );

    // The worker also runs migrations, so it can come up first on a fresh
    // database. The migrator takes an advisory lock, concurrent starts are
    // safe.
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let ledger: Arc<dyn Ledger> = Arc::new(StoreLedger::new(db.pool.clone()));
    let relay: Arc<dyn NotificationRelay> = Arc::new(
        RedisNotificationRelay::new(&config.redis.url)
            .await
            .expect("Failed to connect to Redis"),
    );
    let consumer =
        KafkaIntentConsumer::new(&config.kafka.brokers, &config.kafka.group_id, &config.kafka.topic)
            .expect("Failed to create Kafka consumer");

    let worker = SettlementWorker::new(consumer, ledger, relay, config.pipeline.cas_retries);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    tracing::info!("Settlement worker drained, exiting");
}
