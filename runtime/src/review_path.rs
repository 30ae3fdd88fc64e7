//! Review write path: persist a review mutation, then publish its delta.
//!
//! Each accepted create, update or delete produces exactly one
//! [`CalculationMessage`]. The product's aggregate is snapshotted *before* the
//! mutation reaches storage, so the message describes the state the delta
//! applies to.
//!
//! Publishing is fire-and-forget: once the mutation is stored the caller gets
//! its result, whether or not the channel accepted the message. A publish
//! that is rejected or does not complete within the publish timeout is logged
//! and counted.

use crate::metrics::PublishMetrics;
use catalog_ratings_core::calculation::{CalculationMessage, REVIEW_CALCULATION_TOPIC};
use catalog_ratings_core::catalog::{
    CatalogError, CatalogStore, NewReview, ProductId, Review, ReviewId, ReviewUpdate,
    validate_rating,
};
use catalog_ratings_core::event::SerializedEvent;
use catalog_ratings_core::event_bus::EventBus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default bound on how long a mutation waits for the channel.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Review mutations with calculation publishing.
#[derive(Clone)]
pub struct ReviewWritePath {
    store: Arc<dyn CatalogStore>,
    bus: Arc<dyn EventBus>,
    topic: String,
    publish_timeout: Duration,
    publish_failures: Arc<AtomicU64>,
}

impl ReviewWritePath {
    /// Create a write path publishing to `review-calculation`.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            topic: REVIEW_CALCULATION_TOPIC.to_string(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            publish_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Give up on a publish after `timeout`.
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Calculation messages that were not accepted by the channel.
    ///
    /// Shared by all clones of this write path.
    #[must_use]
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    /// Publish to a different channel.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Channel this path publishes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Reviews of a product.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ProductNotFound`] if the product does not exist.
    pub async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, CatalogError> {
        self.store.list_reviews(product_id).await
    }

    /// One review of a product.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ReviewNotFound`] if no review matches.
    pub async fn get_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
    ) -> Result<Review, CatalogError> {
        self.store.get_review(product_id, review_id).await
    }

    /// Store a new review and publish `countChange = +1`.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] for a rating outside `1..=5`
    /// - [`CatalogError::ProductNotFound`] if the product does not exist
    ///
    /// Nothing is published when an error is returned.
    pub async fn create_review(
        &self,
        product_id: ProductId,
        review: NewReview,
        correlation_id: Option<&str>,
    ) -> Result<Review, CatalogError> {
        validate_rating(review.rating)?;

        let snapshot = self.store.snapshot(product_id).await?;
        let created = self.store.create_review(product_id, review).await?;

        tracing::info!(
            product_id = %product_id,
            review_id = %created.id,
            rating = created.rating,
            "Review created"
        );

        let message = CalculationMessage::created(product_id, snapshot, created.rating);
        self.publish(&message, correlation_id).await;
        Ok(created)
    }

    /// Apply an update to a review and publish `ratingChange = new - old`.
    ///
    /// A message is published even when the rating is unchanged; its delta
    /// is then zero.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] for a rating outside `1..=5`
    /// - [`CatalogError::ReviewNotFound`] if no review matches
    ///   `(product_id, review_id)`
    pub async fn update_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
        update: ReviewUpdate,
        correlation_id: Option<&str>,
    ) -> Result<Review, CatalogError> {
        if let Some(rating) = update.rating {
            validate_rating(rating)?;
        }

        let existing = self.store.get_review(product_id, review_id).await?;
        let old_rating = existing.rating;
        let snapshot = self.store.snapshot(product_id).await?;
        let saved = self.store.save_review(update.apply_to(existing)).await?;

        tracing::info!(
            product_id = %product_id,
            review_id = %review_id,
            old_rating,
            new_rating = saved.rating,
            "Review updated"
        );

        let message = CalculationMessage::updated(product_id, snapshot, old_rating, saved.rating);
        self.publish(&message, correlation_id).await;
        Ok(saved)
    }

    /// Remove a review and publish `countChange = -1`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ReviewNotFound`] if no review matches
    /// `(product_id, review_id)`.
    pub async fn delete_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
        correlation_id: Option<&str>,
    ) -> Result<(), CatalogError> {
        let existing = self.store.get_review(product_id, review_id).await?;
        let snapshot = self.store.snapshot(product_id).await?;
        self.store.delete_review(product_id, review_id).await?;

        tracing::info!(
            product_id = %product_id,
            review_id = %review_id,
            "Review deleted"
        );

        let message = CalculationMessage::deleted(product_id, snapshot, existing.rating);
        self.publish(&message, correlation_id).await;
        Ok(())
    }

    async fn publish(&self, message: &CalculationMessage, correlation_id: Option<&str>) {
        let metadata = serde_json::json!({
            "correlation_id": correlation_id,
            "published_at": chrono::Utc::now().to_rfc3339(),
        });

        let event = match SerializedEvent::from_event(message, Some(metadata)) {
            Ok(event) => event,
            Err(e) => {
                self.record_publish_failure();
                tracing::error!(
                    product_id = %message.product_id,
                    error = %e,
                    "Failed to serialize calculation message"
                );
                return;
            }
        };

        let start = Instant::now();
        let published =
            tokio::time::timeout(self.publish_timeout, self.bus.publish(&self.topic, &event)).await;
        match published {
            Ok(Ok(())) => {
                PublishMetrics::record_publish(start.elapsed());
                tracing::debug!(
                    topic = %self.topic,
                    product_id = %message.product_id,
                    count_change = message.count_change,
                    rating_change = message.rating_change,
                    "Calculation message published"
                );
            }
            Ok(Err(e)) => {
                self.record_publish_failure();
                tracing::error!(
                    topic = %self.topic,
                    product_id = %message.product_id,
                    error = %e,
                    "Failed to publish calculation message"
                );
            }
            Err(_) => {
                self.record_publish_failure();
                tracing::error!(
                    topic = %self.topic,
                    product_id = %message.product_id,
                    timeout_ms = u64::try_from(self.publish_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Timed out publishing calculation message"
                );
            }
        }
    }

    fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        PublishMetrics::record_publish_error();
    }
}
