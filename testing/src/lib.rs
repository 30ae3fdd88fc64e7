//! # Catalog Ratings Testing
//!
//! Testing utilities for the catalog ratings pipeline.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: pub/sub channel with at-most-once delivery
//! - [`RecordingWriteBack`] and [`StoreWriteBack`]: write-back collaborators
//! - Fixtures for products, snapshots and calculation events
//! - proptest strategies for calculation messages
//!
//! ## Example
//!
//! ```ignore
//! use catalog_ratings_testing::{InMemoryEventBus, StoreWriteBack};
//!
//! #[tokio::test]
//! async fn review_updates_average() {
//!     let store = Arc::new(InMemoryCatalogStore::new());
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let reviews = ReviewWritePath::new(store.clone(), bus.clone());
//!
//!     reviews.create_review(product.id, NewReview::with_rating(4), None).await?;
//!
//!     let sent = bus.published_as::<CalculationMessage>(REVIEW_CALCULATION_TOPIC);
//!     assert_eq!(sent[0].count_change, 1);
//! }
//! ```

mod event_bus_mocks;
mod write_back_mocks;

/// Mock implementations of the pipeline's collaborators.
pub mod mocks {
    pub use crate::event_bus_mocks::{InMemoryEventBus, PublishedEvent};
    pub use crate::write_back_mocks::{RecordingWriteBack, StoreWriteBack};
}

/// Test data builders.
pub mod fixtures {
    use catalog_ratings_core::calculation::CalculationMessage;
    use catalog_ratings_core::catalog::{NewProduct, RatingSnapshot};
    use catalog_ratings_core::event::SerializedEvent;

    /// Product body with the given name and price.
    #[must_use]
    pub fn new_product(name: &str, price: f64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: format!("{name} for tests"),
            price,
        }
    }

    /// Aggregate snapshot.
    #[must_use]
    pub const fn snapshot(average_rating: f64, count: u64) -> RatingSnapshot {
        RatingSnapshot {
            average_rating,
            count,
        }
    }

    /// Carrier for a calculation message, tagged with a correlation id.
    ///
    /// # Panics
    ///
    /// Never in practice: a `CalculationMessage` always serializes.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn calculation_event(message: &CalculationMessage, correlation_id: &str) -> SerializedEvent {
        SerializedEvent::from_event(
            message,
            Some(serde_json::json!({ "correlation_id": correlation_id })),
        )
        .expect("calculation messages always serialize")
    }

    /// Install a fmt subscriber that writes through the test harness.
    ///
    /// Safe to call from many tests; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use catalog_ratings_core::calculation::CalculationMessage;
    use catalog_ratings_core::catalog::{MAX_RATING, MIN_RATING, ProductId, RatingSnapshot};
    use proptest::prelude::*;

    /// A valid review rating.
    pub fn rating() -> impl Strategy<Value = u8> {
        MIN_RATING..=MAX_RATING
    }

    /// A consistent snapshot: the average of `count` valid ratings.
    pub fn snapshot() -> impl Strategy<Value = RatingSnapshot> {
        prop::collection::vec(rating(), 0..64).prop_map(|ratings| {
            let count = ratings.len() as u64;
            let sum: u32 = ratings.iter().map(|r| u32::from(*r)).sum();
            #[allow(clippy::cast_precision_loss)]
            let average_rating = if count == 0 {
                0.0
            } else {
                f64::from(sum) / count as f64
            };
            RatingSnapshot {
                average_rating,
                count,
            }
        })
    }

    /// Any message the write path can produce from a consistent snapshot.
    pub fn calculation_message() -> impl Strategy<Value = CalculationMessage> {
        (1_u64..1000, snapshot(), rating(), rating(), 0_u8..3).prop_map(
            |(id, snapshot, old, new, kind)| {
                let product_id = ProductId::new(id);
                match kind {
                    0 => CalculationMessage::created(product_id, snapshot, new),
                    1 => CalculationMessage::updated(product_id, snapshot, old, new),
                    _ => CalculationMessage::deleted(product_id, snapshot, old),
                }
            },
        )
    }
}

// Re-export commonly used items
pub use mocks::{InMemoryEventBus, PublishedEvent, RecordingWriteBack, StoreWriteBack};
