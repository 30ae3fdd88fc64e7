//! # Catalog Ratings Runtime
//!
//! The moving parts of the ratings pipeline, built on the traits in
//! `catalog-ratings-core`.
//!
//! ## Core Components
//!
//! - **[`ReviewWritePath`]**: persists review mutations and publishes one
//!   calculation message per accepted mutation
//! - **[`AggregationConsumer`]**: subscribe-process-reconnect loop that applies
//!   each message and writes the average back with retry
//! - **[`HttpWriteBack`]**: reqwest client for `PUT /private/products/{id}`
//! - **[`InMemoryCatalogStore`]**: process-local catalog store
//!
//! ## Example
//!
//! ```ignore
//! use catalog_ratings_runtime::{AggregationConsumer, HttpWriteBack, ReviewWritePath};
//!
//! // product service
//! let reviews = ReviewWritePath::new(store, event_bus.clone());
//! reviews.create_review(product_id, new_review, Some(correlation_id)).await?;
//!
//! // review processor
//! let write_back = HttpWriteBack::new("http://localhost:3000", timeout)?;
//! AggregationConsumer::new(event_bus, Arc::new(write_back), shutdown_rx).spawn();
//! ```

/// Aggregation consumer loop
pub mod consumer;

/// Environment parsing for service configuration
pub mod config;

/// Health reporting
pub mod health;

/// In-memory catalog store
pub mod memory;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Review write path (delta publisher)
pub mod review_path;

/// HTTP write-back client
pub mod write_back;

pub use consumer::{AggregationConsumer, AggregationOutcome, ConsumeError};
pub use health::{ConsumerHealth, HealthCheck, HealthReport, HealthStatus};
pub use memory::InMemoryCatalogStore;
pub use metrics::PrometheusRecorder;
pub use retry::RetryPolicy;
pub use review_path::ReviewWritePath;
pub use write_back::HttpWriteBack;
