//! Application state for Axum handlers.

use axum::extract::FromRef;
use catalog_ratings_core::catalog::CatalogStore;
use catalog_ratings_runtime::{ConsumerHealth, ReviewWritePath};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// State behind `/health` and `/metrics`.
///
/// Both services expose these routes. The product service attaches its
/// store; the review processor attaches a [`ConsumerHealth`].
#[derive(Clone)]
pub struct OpsState {
    /// Service name reported by `/health`.
    pub service: &'static str,
    /// Service version reported by `/health`.
    pub version: &'static str,
    /// Prometheus handle; `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
    /// Subscription state of the aggregation consumer, if this process runs one.
    pub consumer: Option<ConsumerHealth>,
    /// Catalog store probed by `/health`, if this process owns one.
    pub store: Option<Arc<dyn CatalogStore>>,
}

impl OpsState {
    /// Ops state with metrics disabled and nothing to probe.
    #[must_use]
    pub const fn new(service: &'static str, version: &'static str) -> Self {
        Self {
            service,
            version,
            metrics: None,
            consumer: None,
            store: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Report the consumer's subscription in `/health`.
    #[must_use]
    pub fn with_consumer(mut self, health: ConsumerHealth) -> Self {
        self.consumer = Some(health);
        self
    }

    /// Probe this store in `/health`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CatalogStore>) -> Self {
        self.store = Some(store);
        self
    }
}

/// State shared by the catalog routes of the product service.
#[derive(Clone)]
pub struct AppState {
    /// Products and reviews.
    pub store: Arc<dyn CatalogStore>,
    /// Review mutations that publish calculation messages.
    pub reviews: Arc<ReviewWritePath>,
    /// Health and metrics.
    pub ops: OpsState,
}

impl AppState {
    /// Create state for the catalog router. `/health` probes `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, reviews: ReviewWritePath, ops: OpsState) -> Self {
        Self {
            ops: ops.with_store(store.clone()),
            store,
            reviews: Arc::new(reviews),
        }
    }
}

impl FromRef<AppState> for OpsState {
    fn from_ref(state: &AppState) -> Self {
        state.ops.clone()
    }
}
