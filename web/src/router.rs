//! Router assembly for both services.

use crate::handlers::{health, private_products, products, reviews};
use crate::middleware::correlation_id;
use crate::state::{AppState, OpsState};
use axum::{
    Router,
    extract::FromRef,
    routing::{get, put},
};
use tower_http::trace::TraceLayer;

fn ops_routes<S>() -> Router<S>
where
    OpsState: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
}

/// Routes of the product service: the public catalog, the private
/// write-back endpoint, health and metrics.
pub fn catalog_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/products/:id/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route(
            "/products/:id/reviews/:review_id",
            get(reviews::get_review)
                .put(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .route(
            "/private/products/:id",
            put(private_products::set_average_rating),
        )
        .merge(ops_routes::<AppState>())
        .layer(axum::middleware::from_fn(correlation_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health and metrics only, for processes without a catalog.
pub fn ops_router(ops: OpsState) -> Router {
    ops_routes()
        .layer(axum::middleware::from_fn(correlation_id))
        .layer(TraceLayer::new_for_http())
        .with_state(ops)
}
