//! Review routes, nested under a product.
//!
//! Mutations go through [`ReviewWritePath`](catalog_ratings_runtime::ReviewWritePath),
//! which publishes a calculation message after the store accepts the change.
//! The request's correlation id travels in that message's metadata.

use crate::error::AppError;
use crate::extractors::CorrelationId;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use catalog_ratings_core::catalog::{NewReview, ProductId, Review, ReviewId, ReviewUpdate};

/// `GET /products/:product_id/reviews`
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<u64>,
) -> Result<Json<Vec<Review>>, AppError> {
    Ok(Json(
        state.reviews.list_reviews(ProductId::new(product_id)).await?,
    ))
}

/// `POST /products/:product_id/reviews`
pub async fn create_review(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path(product_id): Path<u64>,
    Json(body): Json<NewReview>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let cid = correlation_id.to_metadata();
    let review = state
        .reviews
        .create_review(ProductId::new(product_id), body, Some(&cid))
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /products/:product_id/reviews/:review_id`
pub async fn get_review(
    State(state): State<AppState>,
    Path((product_id, review_id)): Path<(u64, u64)>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(
        state
            .reviews
            .get_review(ProductId::new(product_id), ReviewId::new(review_id))
            .await?,
    ))
}

/// `PUT /products/:product_id/reviews/:review_id`
pub async fn update_review(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path((product_id, review_id)): Path<(u64, u64)>,
    Json(body): Json<ReviewUpdate>,
) -> Result<Json<Review>, AppError> {
    let cid = correlation_id.to_metadata();
    let review = state
        .reviews
        .update_review(
            ProductId::new(product_id),
            ReviewId::new(review_id),
            body,
            Some(&cid),
        )
        .await?;
    Ok(Json(review))
}

/// `DELETE /products/:product_id/reviews/:review_id`
pub async fn delete_review(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path((product_id, review_id)): Path<(u64, u64)>,
) -> Result<StatusCode, AppError> {
    let cid = correlation_id.to_metadata();
    state
        .reviews
        .delete_review(
            ProductId::new(product_id),
            ReviewId::new(review_id),
            Some(&cid),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
