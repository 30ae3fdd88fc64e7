//! Catalog entities and the store collaborator.
//!
//! Products and reviews live in a source-of-truth store that this pipeline
//! treats as an external collaborator. [`CatalogStore`] is the narrow surface
//! the review write path and the write-back endpoint need from it.
//!
//! `averageRating` on a [`Product`] is eventually consistent. It is only ever
//! changed through [`CatalogStore::set_average_rating`]; readers must never
//! assume it reflects every review recorded so far.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lowest accepted review rating.
pub const MIN_RATING: u8 = 1;

/// Highest accepted review rating.
pub const MAX_RATING: u8 = 5;

/// Product identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl ProductId {
    /// Create a product id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Review identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(pub u64);

impl ReviewId {
    /// Create a review id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product id
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Price in the catalog's currency unit
    pub price: f64,
    /// Denormalized average of the product's review ratings
    pub average_rating: f64,
    /// Number of reviews attributed to the product at read time
    pub rating_count: u64,
}

impl Product {
    /// Aggregate values as seen right now.
    #[must_use]
    pub const fn snapshot(&self) -> RatingSnapshot {
        RatingSnapshot {
            average_rating: self.average_rating,
            count: self.rating_count,
        }
    }
}

/// Body for creating a product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Price
    pub price: f64,
}

/// Partial update of a product's public fields.
///
/// There is deliberately no `average_rating` here: the public catalog API
/// cannot overwrite the denormalized average.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New price
    pub price: Option<f64>,
}

/// A review of a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review id
    pub id: ReviewId,
    /// Product the review belongs to
    pub product_id: ProductId,
    /// Reviewer first name
    pub first_name: String,
    /// Reviewer last name
    pub last_name: String,
    /// Review body
    pub review_text: String,
    /// Rating in `MIN_RATING..=MAX_RATING`
    pub rating: u8,
}

/// Body for creating a review.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    /// Reviewer first name
    #[serde(default)]
    pub first_name: String,
    /// Reviewer last name
    #[serde(default)]
    pub last_name: String,
    /// Review body
    #[serde(default)]
    pub review_text: String,
    /// Rating
    pub rating: u8,
}

impl NewReview {
    /// Anonymous review with only a rating, handy for tests and fixtures.
    #[must_use]
    pub const fn with_rating(rating: u8) -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            review_text: String::new(),
            rating,
        }
    }
}

/// Partial update of a review.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    /// New first name
    pub first_name: Option<String>,
    /// New last name
    pub last_name: Option<String>,
    /// New review body
    pub review_text: Option<String>,
    /// New rating
    pub rating: Option<u8>,
}

impl ReviewUpdate {
    /// Update that only changes the rating.
    #[must_use]
    pub fn rating(rating: u8) -> Self {
        Self {
            rating: Some(rating),
            ..Self::default()
        }
    }

    /// Apply this update on top of an existing review.
    #[must_use]
    pub fn apply_to(self, mut review: Review) -> Review {
        if let Some(first_name) = self.first_name {
            review.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            review.last_name = last_name;
        }
        if let Some(review_text) = self.review_text {
            review.review_text = review_text;
        }
        if let Some(rating) = self.rating {
            review.rating = rating;
        }
        review
    }
}

/// Aggregate state of a product observed by the write path.
///
/// Not guaranteed current by the time a consumer acts on it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RatingSnapshot {
    /// Average rating at observation time
    pub average_rating: f64,
    /// Review count at observation time
    pub count: u64,
}

/// Errors raised by the catalog store and the request path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Product does not exist
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// Review does not exist under the given product
    #[error("Review {review_id} not found for product {product_id}")]
    ReviewNotFound {
        /// Product the lookup was scoped to
        product_id: ProductId,
        /// Missing review
        review_id: ReviewId,
    },

    /// Request carried an invalid value
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Backing storage failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    /// Whether the error is a missing product or review.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ProductNotFound(_) | Self::ReviewNotFound { .. })
    }
}

/// Check a rating against the accepted range.
///
/// # Errors
///
/// Returns [`CatalogError::Validation`] when the rating is outside
/// `MIN_RATING..=MAX_RATING`.
pub fn validate_rating(rating: u8) -> Result<u8, CatalogError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(CatalogError::Validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
        )))
    }
}

/// Source-of-truth store for products and reviews.
///
/// Implementations must be `Send + Sync` so one instance can be shared by all
/// request handlers.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All products.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the store cannot be read.
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError>;

    /// One product, with `rating_count` reflecting its current reviews.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if it does not exist.
    async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError>;

    /// Create a product with a zero average.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the write fails.
    async fn create_product(&self, product: NewProduct) -> Result<Product, CatalogError>;

    /// Update the public fields of a product.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if it does not exist.
    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, CatalogError>;

    /// Delete a product and its reviews.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if it does not exist.
    async fn delete_product(&self, id: ProductId) -> Result<(), CatalogError>;

    /// Replace the stored average unconditionally (last writer wins).
    ///
    /// This is the only mutator of `average_rating`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if it does not exist.
    async fn set_average_rating(
        &self,
        id: ProductId,
        average_rating: f64,
    ) -> Result<Product, CatalogError>;

    /// Reviews of a product.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if the product does not exist.
    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, CatalogError>;

    /// One review, scoped to its product.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ReviewNotFound`] if no review matches
    /// `(product_id, review_id)`.
    async fn get_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
    ) -> Result<Review, CatalogError>;

    /// Insert a new review and assign its id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if the product does not exist.
    async fn create_review(
        &self,
        product_id: ProductId,
        review: NewReview,
    ) -> Result<Review, CatalogError>;

    /// Persist an existing review.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ReviewNotFound`] if the review does not exist.
    async fn save_review(&self, review: Review) -> Result<Review, CatalogError>;

    /// Remove a review.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ReviewNotFound`] if the review does not exist.
    async fn delete_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
    ) -> Result<(), CatalogError>;

    /// Current aggregate snapshot of a product.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if it does not exist.
    async fn snapshot(&self, product_id: ProductId) -> Result<RatingSnapshot, CatalogError> {
        Ok(self.get_product(product_id).await?.snapshot())
    }

    /// Liveness probe used by `/health`.
    ///
    /// Stores with a cheaper round trip than a full listing should override it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the backing storage is unreachable.
    async fn ping(&self) -> Result<(), CatalogError> {
        self.list_products().await.map(drop)
    }
}
