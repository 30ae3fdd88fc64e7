//! Review Processor
//!
//! Subscribes to the `review-calculation` Redis channel, computes each
//! product's new average from the message's snapshot and delta, and writes it
//! back to the product service. Serves `/health` and `/metrics` on the side.
//!
//! Delivery is at-most-once: messages published while the processor is down
//! or reconnecting are lost.
//!
//! # Usage
//!
//! ```bash
//! PRODUCT_SERVICE_URL=http://localhost:3000 cargo run --bin review-processor
//! ```

mod config;

use catalog_ratings_redis::RedisEventBus;
use catalog_ratings_runtime::{AggregationConsumer, HttpWriteBack, PrometheusRecorder};
use catalog_ratings_web::{OpsState, ops_router};
use config::Config;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "review-processor";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,review_processor=debug,catalog_ratings_runtime=debug,catalog_ratings_redis=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        addr = %config.bind_addr(),
        redis = %config.redis_url,
        topic = %config.calculation_topic,
        product_service = %config.product_service_url,
        zero_count_policy = %config.zero_count_policy,
        "Configuration loaded"
    );

    let mut ops = OpsState::new(SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    let mut recorder = PrometheusRecorder::new();
    recorder.install()?;
    if let Some(handle) = recorder.into_handle() {
        ops = ops.with_metrics(handle);
    }

    let bus = Arc::new(RedisEventBus::connect(&config.redis_url).await?);
    let write_back = Arc::new(HttpWriteBack::new(
        config.product_service_url.clone(),
        config.write_back_timeout,
    )?);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = AggregationConsumer::new(bus, write_back, shutdown_rx)
        .with_topic(config.calculation_topic.clone())
        .with_retry_policy(config.retry_policy.clone())
        .with_zero_count_policy(config.zero_count_policy)
        .with_reconnect_delay(config.reconnect_delay);
    let consumer_health = consumer.health();
    let consumer_task = consumer.spawn();
    tracing::info!("Aggregation consumer started");

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Health server listening");

    let app = ops_router(ops.with_consumer(consumer_health));
    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down gracefully...");
    let _ = shutdown_tx.send(());

    consumer_task.await?;
    server.await??;

    tracing::info!("Review processor stopped");
    Ok(())
}
