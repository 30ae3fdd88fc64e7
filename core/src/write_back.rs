//! Write-back collaborator used by the aggregation consumer.
//!
//! The consumed contract is `PUT /private/products/{id}` with body
//! `{"averageRating": number}`. The endpoint replaces the stored average
//! unconditionally and returns the updated product, or not-found.

use crate::catalog::{Product, ProductId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of the write-back call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageRatingUpdate {
    /// Newly computed average
    pub average_rating: f64,
}

/// Failures of a write-back call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteBackError {
    /// The product no longer exists
    #[error("Product {0} not found")]
    NotFound(ProductId),

    /// The call did not complete within its timeout
    #[error("Write-back timed out")]
    Timeout,

    /// Connection or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The product store answered with a server error
    #[error("Product store returned {status}: {body}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body, for logs
        body: String,
    },

    /// The product store refused the request
    #[error("Write-back rejected with {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, for logs
        body: String,
    },

    /// The response could not be decoded
    #[error("Invalid write-back response: {0}")]
    Decode(String),
}

impl WriteBackError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_) | Self::Server { .. })
    }
}

/// Persists a newly computed average for a product.
#[async_trait]
pub trait WriteBack: Send + Sync {
    /// Replace the stored average of `product_id`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteBackError`]; see [`WriteBackError::is_transient`] for
    /// which failures are worth retrying.
    async fn write_back(
        &self,
        product_id: ProductId,
        average_rating: f64,
    ) -> Result<Product, WriteBackError>;
}
