//! Write path, channel and consumer running together in one process.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use catalog_ratings_core::calculation::{CalculationMessage, REVIEW_CALCULATION_TOPIC};
use catalog_ratings_core::catalog::{CatalogStore, NewReview, ProductId, ReviewUpdate};
use catalog_ratings_runtime::{AggregationConsumer, InMemoryCatalogStore, ReviewWritePath};
use catalog_ratings_testing::fixtures::{init_tracing, new_product};
use catalog_ratings_testing::{InMemoryEventBus, StoreWriteBack};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(2);

struct Pipeline {
    store: Arc<InMemoryCatalogStore>,
    bus: Arc<InMemoryEventBus>,
    reviews: ReviewWritePath,
    shutdown: broadcast::Sender<()>,
    consumer: tokio::task::JoinHandle<()>,
}

impl Pipeline {
    async fn start() -> Self {
        init_tracing();
        let store = Arc::new(InMemoryCatalogStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        let consumer = AggregationConsumer::new(
            bus.clone(),
            Arc::new(StoreWriteBack::new(store.clone())),
            shutdown_rx,
        )
        .spawn();
        assert!(bus.wait_for_subscribers(REVIEW_CALCULATION_TOPIC, 1, WAIT).await);

        Self {
            reviews: ReviewWritePath::new(store.clone(), bus.clone()),
            store,
            bus,
            shutdown,
            consumer,
        }
    }

    /// Wait until the stored average reaches `expected`.
    async fn settled(&self, product_id: ProductId, expected: f64) -> f64 {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let average = self.store.get_product(product_id).await.unwrap().average_rating;
            if (average - expected).abs() < 1e-9 || tokio::time::Instant::now() >= deadline {
                return average;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        tokio::time::timeout(WAIT, self.consumer).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn sequential_mutations_keep_the_true_average() {
    let pipeline = Pipeline::start().await;
    let product = pipeline
        .store
        .create_product(new_product("desk", 120.0))
        .await
        .unwrap();

    let mut ids = Vec::new();
    for (rating, expected) in [(4, 4.0), (2, 3.0), (5, 11.0 / 3.0)] {
        let review = pipeline
            .reviews
            .create_review(product.id, NewReview::with_rating(rating), None)
            .await
            .unwrap();
        ids.push(review.id);
        let average = pipeline.settled(product.id, expected).await;
        assert!((average - expected).abs() < 1e-9, "got {average}, want {expected}");
    }

    // 4, 2, 5 -> 4, 5, 5
    pipeline
        .reviews
        .update_review(product.id, ids[1], ReviewUpdate::rating(5), None)
        .await
        .unwrap();
    let average = pipeline.settled(product.id, 14.0 / 3.0).await;
    assert!((average - 14.0 / 3.0).abs() < 1e-9);

    // 4, 5, 5 -> 5, 5
    pipeline
        .reviews
        .delete_review(product.id, ids[0], None)
        .await
        .unwrap();
    let average = pipeline.settled(product.id, 5.0).await;
    assert!((average - 5.0).abs() < 1e-9);

    let stored = pipeline.store.get_product(product.id).await.unwrap();
    assert_eq!(stored.rating_count, 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn deleting_every_review_resets_the_average() {
    let pipeline = Pipeline::start().await;
    let product = pipeline
        .store
        .create_product(new_product("chair", 60.0))
        .await
        .unwrap();

    let review = pipeline
        .reviews
        .create_review(product.id, NewReview::with_rating(3), None)
        .await
        .unwrap();
    assert!((pipeline.settled(product.id, 3.0).await - 3.0).abs() < 1e-9);

    pipeline
        .reviews
        .delete_review(product.id, review.id, None)
        .await
        .unwrap();
    assert!(pipeline.settled(product.id, 0.0).await.abs() < 1e-9);

    pipeline.stop().await;
}

#[tokio::test]
async fn sequential_creates_publish_fresh_snapshots() {
    let pipeline = Pipeline::start().await;
    let product = pipeline
        .store
        .create_product(new_product("lamp", 30.0))
        .await
        .unwrap();

    for _ in 0..3 {
        pipeline
            .reviews
            .create_review(product.id, NewReview::with_rating(4), None)
            .await
            .unwrap();
        let average = pipeline.settled(product.id, 4.0).await;
        assert!((average - 4.0).abs() < 1e-9, "got {average}");
    }

    let snapshots: Vec<(u64, f64, f64)> = pipeline
        .bus
        .published_as::<CalculationMessage>(REVIEW_CALCULATION_TOPIC)
        .into_iter()
        .map(|m| (m.original_count, m.average_rating, m.rating_change))
        .collect();
    assert_eq!(snapshots, vec![(0, 0.0, 4.0), (1, 4.0, 4.0), (2, 4.0, 4.0)]);

    let stored = pipeline.store.get_product(product.id).await.unwrap();
    assert_eq!(stored.rating_count, 3);
    assert!((stored.average_rating - 4.0).abs() < 1e-9);

    pipeline.stop().await;
}
