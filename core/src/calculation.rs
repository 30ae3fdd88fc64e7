//! Review calculation message and the incremental-average formula.
//!
//! Every accepted review mutation produces exactly one [`CalculationMessage`].
//! The message carries the product's aggregate *as observed by the publisher*
//! plus the delta caused by the mutation:
//!
//! | Mutation | `count_change` | `rating_change` |
//! |----------|----------------|-----------------|
//! | create   | `+1`           | `+rating`       |
//! | update   | `0`            | `new - old`     |
//! | delete   | `-1`           | `-rating`       |
//!
//! The consumer applies the same formula to every kind:
//!
//! ```text
//! new_average = (average_rating * original_count + rating_change)
//!             / (original_count + count_change)
//! ```
//!
//! # Consistency
//!
//! The snapshot may be stale by the time the message is consumed. Two
//! mutations on the same product racing between snapshot read and write-back
//! can leave a transiently wrong average. That gap is inherent to
//! snapshot-delta messages over an at-most-once channel and is kept as is.
//!
//! # Example
//!
//! ```
//! use catalog_ratings_core::calculation::{CalculationMessage, compute_average};
//! use catalog_ratings_core::catalog::{ProductId, RatingSnapshot};
//!
//! let empty = RatingSnapshot::default();
//! let message = CalculationMessage::created(ProductId::new(1), empty, 4);
//!
//! assert_eq!(compute_average(&message), Ok(4.0));
//! ```

use crate::catalog::{ProductId, RatingSnapshot};
use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Channel the write path publishes to and the consumer subscribes to.
pub const REVIEW_CALCULATION_TOPIC: &str = "review-calculation";

/// Incremental change to a product's rating aggregate.
///
/// Immutable once published. It has no persisted identity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationMessage {
    /// Product whose average is affected
    pub product_id: ProductId,
    /// Average observed before this write
    pub average_rating: f64,
    /// Review count observed before this write
    pub original_count: u64,
    /// Delta to the review count (`+1`, `0` or `-1`)
    pub count_change: i64,
    /// Delta to the sum of ratings
    pub rating_change: f64,
}

impl CalculationMessage {
    /// Message for a newly created review.
    #[must_use]
    pub fn created(product_id: ProductId, snapshot: RatingSnapshot, rating: u8) -> Self {
        Self {
            product_id,
            average_rating: snapshot.average_rating,
            original_count: snapshot.count,
            count_change: 1,
            rating_change: f64::from(rating),
        }
    }

    /// Message for a review whose rating went from `old_rating` to `new_rating`.
    #[must_use]
    pub fn updated(
        product_id: ProductId,
        snapshot: RatingSnapshot,
        old_rating: u8,
        new_rating: u8,
    ) -> Self {
        Self {
            product_id,
            average_rating: snapshot.average_rating,
            original_count: snapshot.count,
            count_change: 0,
            rating_change: f64::from(new_rating) - f64::from(old_rating),
        }
    }

    /// Message for a deleted review that had `old_rating`.
    #[must_use]
    pub fn deleted(product_id: ProductId, snapshot: RatingSnapshot, old_rating: u8) -> Self {
        Self {
            product_id,
            average_rating: snapshot.average_rating,
            original_count: snapshot.count,
            count_change: -1,
            rating_change: -f64::from(old_rating),
        }
    }

    /// Review count once this write is applied.
    #[must_use]
    pub fn new_count(&self) -> i64 {
        i64::try_from(self.original_count)
            .unwrap_or(i64::MAX)
            .saturating_add(self.count_change)
    }
}

impl Event for CalculationMessage {
    fn event_type(&self) -> &'static str {
        "ReviewCalculation.v1"
    }
}

/// Degenerate arithmetic while aggregating a message.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum AggregationError {
    /// The write leaves the product with no reviews (last review deleted)
    #[error("Product {product_id} has no reviews left (new count {new_count})")]
    EmptyProduct {
        /// Affected product
        product_id: ProductId,
        /// `original_count + count_change`
        new_count: i64,
    },

    /// The formula produced NaN or infinity
    #[error("Average for product {product_id} is not a finite number")]
    NonFinite {
        /// Affected product
        product_id: ProductId,
    },
}

/// Apply a message's delta to its embedded snapshot.
///
/// Pure: the same message always yields the same result.
///
/// # Errors
///
/// - [`AggregationError::EmptyProduct`] when `original_count + count_change <= 0`
/// - [`AggregationError::NonFinite`] when the snapshot holds a non-finite value
#[allow(clippy::cast_precision_loss)] // review counts stay far below 2^52
pub fn compute_average(message: &CalculationMessage) -> Result<f64, AggregationError> {
    let new_count = message.new_count();
    if new_count <= 0 {
        return Err(AggregationError::EmptyProduct {
            product_id: message.product_id,
            new_count,
        });
    }

    let dividend =
        message.average_rating * message.original_count as f64 + message.rating_change;
    let average = dividend / new_count as f64;

    if average.is_finite() {
        Ok(average)
    } else {
        Err(AggregationError::NonFinite {
            product_id: message.product_id,
        })
    }
}

/// What the consumer does when the last review of a product is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ZeroCountPolicy {
    /// Write back an average of `0`
    #[default]
    ResetToZero,
    /// Leave the stored average untouched
    Skip,
}

impl ZeroCountPolicy {
    /// Resolve a message into the average to write back, if any.
    ///
    /// `Ok(None)` means the write-back is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::NonFinite`]; empty products are resolved by
    /// the policy and never returned as errors.
    pub fn resolve(self, message: &CalculationMessage) -> Result<Option<f64>, AggregationError> {
        match compute_average(message) {
            Ok(average) => Ok(Some(average)),
            Err(AggregationError::EmptyProduct { .. }) => match self {
                Self::ResetToZero => Ok(Some(0.0)),
                Self::Skip => Ok(None),
            },
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for ZeroCountPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResetToZero => write!(f, "reset"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for ZeroCountPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" | "zero" => Ok(Self::ResetToZero),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown zero-count policy '{other}' (expected reset or skip)")),
        }
    }
}
