//! Write-back endpoint called by the review processor.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use catalog_ratings_core::catalog::{Product, ProductId};
use catalog_ratings_core::write_back::AverageRatingUpdate;

/// `PUT /private/products/:id`
///
/// Replaces the stored average unconditionally; the last write wins.
///
/// # Errors
///
/// - 404 if the product does not exist
/// - 422 if the average is not a finite number
pub async fn set_average_rating(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<AverageRatingUpdate>,
) -> Result<Json<Product>, AppError> {
    if !body.average_rating.is_finite() {
        return Err(AppError::validation(format!(
            "averageRating must be a finite number, got {}",
            body.average_rating
        )));
    }

    let id = ProductId::new(id);
    let product = state
        .store
        .set_average_rating(id, body.average_rating)
        .await?;

    tracing::debug!(
        product_id = %id,
        average_rating = product.average_rating,
        "Average rating written back"
    );
    Ok(Json(product))
}
