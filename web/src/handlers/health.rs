//! Health and metrics endpoints.
//!
//! These endpoints are used by load balancers, monitoring systems and the
//! Prometheus scraper.

use crate::error::AppError;
use crate::state::OpsState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use catalog_ratings_runtime::{HealthCheck, HealthReport, HealthStatus};

const STORE_COMPONENT: &str = "catalog-store";

/// Liveness plus the store and the consumer's subscription, when attached.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
pub async fn health_check(State(ops): State<OpsState>) -> (StatusCode, Json<HealthReport>) {
    let mut checks = vec![HealthCheck::healthy("http")];
    if let Some(store) = &ops.store {
        checks.push(match store.ping().await {
            Ok(()) => HealthCheck::healthy(STORE_COMPONENT),
            Err(e) => {
                tracing::warn!(error = %e, "Catalog store health probe failed");
                HealthCheck::unhealthy(STORE_COMPONENT, e.to_string())
            }
        });
    }
    if let Some(consumer) = &ops.consumer {
        checks.push(consumer.check());
    }

    let report = HealthReport::new(ops.service, ops.version, checks);
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}

/// Prometheus text exposition.
///
/// # Errors
///
/// 404 when metrics are disabled.
#[allow(clippy::unused_async)]
pub async fn metrics(State(ops): State<OpsState>) -> Result<impl IntoResponse, AppError> {
    let handle = ops
        .metrics
        .ok_or_else(|| AppError::not_found("metrics are disabled"))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
