//! Review write path: one calculation message per accepted mutation.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use catalog_ratings_core::calculation::{CalculationMessage, REVIEW_CALCULATION_TOPIC};
use catalog_ratings_core::catalog::{
    CatalogError, CatalogStore, NewReview, ProductId, ReviewId, ReviewUpdate,
};
use catalog_ratings_core::event::SerializedEvent;
use catalog_ratings_core::event_bus::{EventBus, EventBusError, EventStream};
use catalog_ratings_runtime::{InMemoryCatalogStore, ReviewWritePath};
use catalog_ratings_testing::InMemoryEventBus;
use catalog_ratings_testing::fixtures::new_product;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<InMemoryCatalogStore>,
    bus: Arc<InMemoryEventBus>,
    reviews: ReviewWritePath,
    product_id: ProductId,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(InMemoryCatalogStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let reviews = ReviewWritePath::new(store.clone(), bus.clone());
        let product_id = store
            .create_product(new_product("kettle", 30.0))
            .await
            .unwrap()
            .id;

        Self {
            store,
            bus,
            reviews,
            product_id,
        }
    }

    fn messages(&self) -> Vec<CalculationMessage> {
        self.bus
            .published_as::<CalculationMessage>(REVIEW_CALCULATION_TOPIC)
    }
}

#[tokio::test]
async fn create_publishes_snapshot_before_the_write() {
    let h = Harness::new().await;
    h.store.set_average_rating(h.product_id, 3.0).await.unwrap();
    h.store
        .create_review(h.product_id, NewReview::with_rating(3))
        .await
        .unwrap();

    let review = h
        .reviews
        .create_review(h.product_id, NewReview::with_rating(5), Some("req-42"))
        .await
        .unwrap();

    assert_eq!(review.rating, 5);
    let messages = h.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0],
        CalculationMessage {
            product_id: h.product_id,
            average_rating: 3.0,
            original_count: 1,
            count_change: 1,
            rating_change: 5.0,
        }
    );

    let metadata = h.bus.published_metadata();
    let metadata = metadata[0].as_ref().unwrap();
    assert_eq!(metadata["correlation_id"], "req-42");
    assert!(metadata["published_at"].is_string());
}

#[tokio::test]
async fn create_for_missing_product_publishes_nothing() {
    let h = Harness::new().await;

    let err = h
        .reviews
        .create_review(ProductId::new(404), NewReview::with_rating(4), None)
        .await
        .unwrap_err();

    assert_eq!(err, CatalogError::ProductNotFound(ProductId::new(404)));
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn invalid_rating_publishes_nothing() {
    let h = Harness::new().await;

    let err = h
        .reviews
        .create_review(h.product_id, NewReview::with_rating(0), None)
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Validation(_)));
    assert!(h.store.list_reviews(h.product_id).await.unwrap().is_empty());
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn update_publishes_rating_difference() {
    let h = Harness::new().await;
    let review = h
        .reviews
        .create_review(h.product_id, NewReview::with_rating(2), None)
        .await
        .unwrap();
    h.store.set_average_rating(h.product_id, 2.0).await.unwrap();
    h.bus.clear();

    let updated = h
        .reviews
        .update_review(h.product_id, review.id, ReviewUpdate::rating(5), None)
        .await
        .unwrap();

    assert_eq!(updated.rating, 5);
    let messages = h.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].count_change, 0);
    assert_eq!(messages[0].original_count, 1);
    assert!((messages[0].average_rating - 2.0).abs() < f64::EPSILON);
    assert!((messages[0].rating_change - 3.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn update_without_rating_change_still_publishes_once() {
    let h = Harness::new().await;
    let review = h
        .reviews
        .create_review(h.product_id, NewReview::with_rating(4), None)
        .await
        .unwrap();
    h.bus.clear();

    let update = ReviewUpdate {
        review_text: Some("still good".to_string()),
        ..ReviewUpdate::default()
    };
    let updated = h
        .reviews
        .update_review(h.product_id, review.id, update, None)
        .await
        .unwrap();

    assert_eq!(updated.review_text, "still good");
    let messages = h.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].rating_change.abs() < f64::EPSILON);
}

#[tokio::test]
async fn update_of_review_under_other_product_is_not_found() {
    let h = Harness::new().await;
    let other = h
        .store
        .create_product(new_product("toaster", 25.0))
        .await
        .unwrap();
    let review = h
        .reviews
        .create_review(other.id, NewReview::with_rating(4), None)
        .await
        .unwrap();
    h.bus.clear();

    let err = h
        .reviews
        .update_review(h.product_id, review.id, ReviewUpdate::rating(1), None)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(h.bus.published().is_empty());
    assert_eq!(
        h.store.get_review(other.id, review.id).await.unwrap().rating,
        4
    );
}

#[tokio::test]
async fn delete_publishes_negative_delta() {
    let h = Harness::new().await;
    let review = h
        .reviews
        .create_review(h.product_id, NewReview::with_rating(5), None)
        .await
        .unwrap();
    h.reviews
        .create_review(h.product_id, NewReview::with_rating(3), None)
        .await
        .unwrap();
    h.store.set_average_rating(h.product_id, 4.0).await.unwrap();
    h.bus.clear();

    h.reviews
        .delete_review(h.product_id, review.id, None)
        .await
        .unwrap();

    let messages = h.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].count_change, -1);
    assert_eq!(messages[0].original_count, 2);
    assert!((messages[0].rating_change + 5.0).abs() < f64::EPSILON);
    assert_eq!(h.store.snapshot(h.product_id).await.unwrap().count, 1);
}

#[tokio::test]
async fn delete_of_missing_review_is_not_found() {
    let h = Harness::new().await;

    let err = h
        .reviews
        .delete_review(h.product_id, ReviewId::new(77), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CatalogError::ReviewNotFound {
            product_id: h.product_id,
            review_id: ReviewId::new(77),
        }
    );
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn publish_failure_does_not_fail_the_mutation() {
    let h = Harness::new().await;
    h.bus.fail_publishes(true);

    let review = h
        .reviews
        .create_review(h.product_id, NewReview::with_rating(4), None)
        .await
        .expect("mutation succeeds even when the channel rejects the message");

    assert_eq!(
        h.store.get_review(h.product_id, review.id).await.unwrap(),
        review
    );
    assert!(h.bus.published().is_empty());
    assert_eq!(h.reviews.publish_failures(), 1);
}

/// Channel that accepts the connection but never answers a publish.
struct StalledBus;

impl EventBus for StalledBus {
    fn publish(
        &self,
        _topic: &str,
        _event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(std::future::pending())
    }

    fn subscribe(
        &self,
        _topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn stalled_channel_does_not_block_the_mutation() {
    let store = Arc::new(InMemoryCatalogStore::new());
    let product_id = store
        .create_product(new_product("kettle", 30.0))
        .await
        .unwrap()
        .id;
    let reviews = ReviewWritePath::new(store.clone(), Arc::new(StalledBus))
        .with_publish_timeout(Duration::from_millis(50));

    let review = tokio::time::timeout(
        Duration::from_secs(2),
        reviews.create_review(product_id, NewReview::with_rating(4), None),
    )
    .await
    .expect("mutation returns once the publish times out")
    .unwrap();

    assert_eq!(store.get_review(product_id, review.id).await.unwrap(), review);
    assert_eq!(reviews.publish_failures(), 1);
}

#[tokio::test]
async fn custom_topic_is_used() {
    let h = Harness::new().await;
    let reviews = h.reviews.clone().with_topic("ratings-staging");
    assert_eq!(reviews.topic(), "ratings-staging");

    reviews
        .create_review(h.product_id, NewReview::with_rating(4), None)
        .await
        .unwrap();

    assert!(h.messages().is_empty());
    assert_eq!(h.bus.published()[0].topic, "ratings-staging");
}
