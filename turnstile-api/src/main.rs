use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnstile_api::observers::ObserverRegistry;
use turnstile_api::{app, relay, AppState};
use turnstile_booking::{PublishPolicy, ReservationIntake, SeedService};
use turnstile_core::{IntentProducer, InventoryCache, Ledger, NotificationRelay};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "turnstile_api=debug,turnstile_booking=debug,turnstile_store=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = turnstile_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting Turnstile API on port {}", config.server.port);

    // Postgres connection + schema
    let db = turnstile_store::DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Redis connections
    let cache = turnstile_store::RedisInventoryCache::new(
        &config.redis.url,
        Duration::from_millis(config.redis.op_timeout_ms),
    )
    .await
    .expect("Failed to connect to Redis");
    let notifier = turnstile_store::RedisNotificationRelay::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");
    let subscriber = turnstile_store::NotificationSubscriber::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    // Kafka connection
    let producer =
        turnstile_store::KafkaIntentProducer::new(&config.kafka.brokers, &config.kafka.topic)
            .expect("Failed to create Kafka producer");

    let cache: Arc<dyn InventoryCache> = Arc::new(cache);
    let producer: Arc<dyn IntentProducer> = Arc::new(producer);
    let notifier: Arc<dyn NotificationRelay> = Arc::new(notifier);
    let ledger: Arc<dyn Ledger> = Arc::new(turnstile_store::StoreLedger::new(db.pool.clone()));

    let intake = Arc::new(ReservationIntake::new(
        cache.clone(),
        producer,
        PublishPolicy {
            attempts: config.pipeline.publish_attempts,
            backoff: Duration::from_millis(config.pipeline.publish_backoff_ms),
        },
    ));
    let seeder = Arc::new(SeedService::new(ledger, cache, notifier));
    let observers = Arc::new(ObserverRegistry::new());

    // Bridge the notification channels onto connected SSE clients.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let events = subscriber
        .events()
        .await
        .expect("Failed to subscribe to notification channels");
    tokio::spawn(relay::run_relay(
        Box::pin(events),
        observers.clone(),
        shutdown_rx,
    ));

    let app = app(AppState {
        intake,
        seeder,
        observers,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .unwrap();
}
