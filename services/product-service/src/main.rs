//! Product Service
//!
//! Catalog HTTP service. Review mutations publish calculation messages on the
//! `review-calculation` Redis channel; the review processor consumes them and
//! writes averages back through `PUT /private/products/:id`.
//!
//! # Usage
//!
//! ```bash
//! docker run -p 6379:6379 redis:7
//! cargo run --bin product-service
//! ```

mod config;

use catalog_ratings_redis::RedisEventBus;
use catalog_ratings_runtime::{InMemoryCatalogStore, PrometheusRecorder, ReviewWritePath};
use catalog_ratings_web::{AppState, OpsState, catalog_router};
use config::Config;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "product-service";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,product_service=debug,catalog_ratings_runtime=debug,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        addr = %config.bind_addr(),
        redis = %config.redis_url,
        topic = %config.calculation_topic,
        metrics = config.metrics_enabled,
        publish_timeout = ?config.publish_timeout,
        "Configuration loaded"
    );

    let mut ops = OpsState::new(SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    if config.metrics_enabled {
        let mut recorder = PrometheusRecorder::new();
        recorder.install()?;
        if let Some(handle) = recorder.into_handle() {
            ops = ops.with_metrics(handle);
        }
    }

    let bus = Arc::new(
        RedisEventBus::builder()
            .redis_url(&config.redis_url)
            .timeout(config.publish_timeout)
            .build()
            .await?,
    );
    tracing::info!("Connected to Redis");

    let store = Arc::new(InMemoryCatalogStore::new());
    let reviews = ReviewWritePath::new(store.clone(), bus)
        .with_topic(config.calculation_topic.clone())
        .with_publish_timeout(config.publish_timeout);
    let app = catalog_router(AppState::new(store, reviews, ops));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Product service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Product service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
