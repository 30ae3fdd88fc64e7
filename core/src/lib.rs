//! # Catalog Ratings Core
//!
//! Core types and traits for the catalog ratings pipeline.
//!
//! A product's `averageRating` is denormalized data. Review mutations never
//! recompute it inline: the review write path publishes a
//! [`CalculationMessage`] carrying a snapshot of the product's aggregate plus
//! the delta caused by the mutation, and an aggregation consumer computes the
//! new average and writes it back through a private endpoint.
//!
//! ```text
//! ┌──────────────┐  persist  ┌──────────────┐
//! │ Review write │──────────►│ CatalogStore │◄──────────────┐
//! │     path     │           └──────────────┘               │
//! └──────┬───────┘                                          │ write-back
//!        │ publish CalculationMessage                       │ (PUT /private/products/:id)
//!        ▼                                                  │
//! ┌──────────────┐  subscribe ┌─────────────────────┐       │
//! │   EventBus   │───────────►│ Aggregation consumer│───────┘
//! │ "review-     │            │  compute_average()  │
//! │ calculation" │            └─────────────────────┘
//! └──────────────┘
//! ```
//!
//! This crate holds no I/O. It defines:
//!
//! - [`catalog`]: products, reviews and the [`CatalogStore`] collaborator
//! - [`calculation`]: the message contract and the incremental-average formula
//! - [`event`] / [`event_bus`]: the serialized carrier and the pub/sub trait
//! - [`write_back`]: the [`WriteBack`] collaborator used by the consumer

pub mod calculation;
pub mod catalog;
pub mod event;
pub mod event_bus;
pub mod write_back;

pub use calculation::{
    AggregationError, CalculationMessage, REVIEW_CALCULATION_TOPIC, ZeroCountPolicy,
    compute_average,
};
pub use catalog::{
    CatalogError, CatalogStore, NewProduct, NewReview, Product, ProductId, ProductUpdate,
    RatingSnapshot, Review, ReviewId, ReviewUpdate,
};
pub use event::{Event, EventError, SerializedEvent};
pub use event_bus::{EventBus, EventBusError, EventStream};
pub use write_back::{AverageRatingUpdate, WriteBack, WriteBackError};
