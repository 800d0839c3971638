use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use folio_api::worker::{spawn_consumers, Consumers};
use folio_api::{app, AppState};
use folio_catalog::{seed_inventory, InventoryHandler, InventoryRepository, Product};
use folio_core::{DedupStore, EventBroker};
use folio_order::{
    DispatchHandler, FixedShipping, IngestionTimeouts, NotificationHandler, OrderIngestionService, OrderRepository,
    ShippingMethod,
};
use folio_store::{
    Config, DbClient, HttpNotificationClient, KafkaBroker, PostgresOrderRepository, RedisClient, RedisDedup,
    RedisInventory,
};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "folio_api=debug,folio_order=debug,folio_catalog=debug,folio_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Folio API on port {}", config.server.port);

    // Postgres: order store
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let orders: Arc<dyn OrderRepository> = Arc::new(PostgresOrderRepository::new(db.pool.clone()));

    // Redis: inventory and dedup markers
    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let inventory: Arc<dyn InventoryRepository> = Arc::new(RedisInventory::new(redis.clone(), config.redis.marker_ttl()));
    let dedup: Arc<dyn DedupStore> = Arc::new(RedisDedup::new(redis));

    // Kafka: fan-out channels
    let broker: Arc<dyn EventBroker> = Arc::new(
        KafkaBroker::new(&config.kafka.brokers, &config.kafka.group_prefix)
            .context("Failed to create Kafka producer")?,
    );

    if config.catalog.seed_on_start {
        seed_inventory(inventory.as_ref(), &Product::catalog(), config.catalog.initial_stock)
            .await
            .context("Failed to seed catalogue stock")?;
    }

    let ingestion = Arc::new(OrderIngestionService::new(
        orders.clone(),
        broker.clone(),
        config.channels.clone(),
        IngestionTimeouts {
            store_write: config.timeouts.store_write(),
            publish: config.timeouts.publish(),
        },
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let workers = if config.workers.enabled {
        let shipping_method: ShippingMethod = config
            .dispatch
            .shipping_method
            .parse()
            .map_err(anyhow::Error::msg)?;
        let notifier = HttpNotificationClient::new(&config.notification.endpoint, config.timeouts.notification())
            .context("Failed to create notification client")?;

        let consumers = Consumers {
            inventory: Arc::new(InventoryHandler::new(inventory.clone())),
            dispatch: Arc::new(DispatchHandler::new(orders.clone(), Arc::new(FixedShipping(shipping_method)))),
            notification: Arc::new(NotificationHandler::new(
                Arc::new(notifier),
                dedup,
                config.notification.group_id.clone(),
                config.notification.retry.clone(),
                config.timeouts.notification(),
            )
            .with_retention(config.redis.marker_ttl())),
        };
        spawn_consumers(
            broker.clone(),
            &config.channels,
            consumers,
            config.workers.reconnect_delay(),
            &shutdown_tx,
        )
    } else {
        tracing::warn!("Consumer workers disabled; only ingestion is running");
        Vec::new()
    };

    let app = app(AppState { ingestion, orders, inventory });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("HTTP server stopped, waiting for consumers");
    let _ = shutdown_tx.send(());
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Consumer task failed: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
