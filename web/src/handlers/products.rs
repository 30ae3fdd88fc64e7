//! Public product routes.
//!
//! Thin adapters over [`CatalogStore`](catalog_ratings_core::catalog::CatalogStore).
//! None of these publish calculation messages; deleting a product removes its
//! reviews along with it.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use catalog_ratings_core::catalog::{NewProduct, Product, ProductId, ProductUpdate};

/// `GET /products`
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.store.list_products().await?))
}

/// `POST /products`
pub async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state.store.create_product(body).await?;
    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// `GET /products/:id`
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.store.get_product(ProductId::new(id)).await?))
}

/// `PUT /products/:id`
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<ProductUpdate>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(
        state.store.update_product(ProductId::new(id), body).await?,
    ))
}

/// `DELETE /products/:id`
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    let id = ProductId::new(id);
    state.store.delete_product(id).await?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}
