//! Write-back collaborators for consumer tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use async_trait::async_trait;
use catalog_ratings_core::catalog::{CatalogError, CatalogStore, Product, ProductId};
use catalog_ratings_core::write_back::{WriteBack, WriteBackError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Records every write-back call and replays scripted failures.
///
/// Calls pop scripted results first; once the script is empty every call
/// succeeds and returns a placeholder product carrying the written average.
///
/// # Example
///
/// ```
/// use catalog_ratings_testing::RecordingWriteBack;
/// use catalog_ratings_core::catalog::ProductId;
/// use catalog_ratings_core::write_back::{WriteBack, WriteBackError};
///
/// # async fn example() {
/// let write_back = RecordingWriteBack::new();
/// write_back.fail_next(WriteBackError::Timeout);
///
/// assert!(write_back.write_back(ProductId::new(1), 4.0).await.is_err());
/// assert!(write_back.write_back(ProductId::new(1), 4.0).await.is_ok());
/// assert_eq!(write_back.call_count(), 2);
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingWriteBack {
    calls: Arc<Mutex<Vec<(ProductId, f64)>>>,
    script: Arc<Mutex<VecDeque<WriteBackError>>>,
    always: Arc<Mutex<Option<WriteBackError>>>,
}

impl RecordingWriteBack {
    /// Create a write-back that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next unscripted call with `error`.
    pub fn fail_next(&self, error: WriteBackError) {
        self.script.lock().unwrap().push_back(error);
    }

    /// Fail every call with `error` once the script is exhausted.
    pub fn fail_always(&self, error: WriteBackError) {
        *self.always.lock().unwrap() = Some(error);
    }

    /// Every call, in order, including failed ones.
    #[must_use]
    pub fn calls(&self) -> Vec<(ProductId, f64)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WriteBack for RecordingWriteBack {
    async fn write_back(
        &self,
        product_id: ProductId,
        average_rating: f64,
    ) -> Result<Product, WriteBackError> {
        self.calls.lock().unwrap().push((product_id, average_rating));

        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.always.lock().unwrap().clone() {
            return Err(error);
        }

        Ok(Product {
            id: product_id,
            name: String::new(),
            description: String::new(),
            price: 0.0,
            average_rating,
            rating_count: 0,
        })
    }
}

/// Write-back that goes straight to a [`CatalogStore`], skipping HTTP.
///
/// Lets pipeline tests run the whole loop in one process.
#[derive(Clone)]
pub struct StoreWriteBack {
    store: Arc<dyn CatalogStore>,
}

impl StoreWriteBack {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WriteBack for StoreWriteBack {
    async fn write_back(
        &self,
        product_id: ProductId,
        average_rating: f64,
    ) -> Result<Product, WriteBackError> {
        self.store
            .set_average_rating(product_id, average_rating)
            .await
            .map_err(|e| match e {
                CatalogError::ProductNotFound(id) => WriteBackError::NotFound(id),
                CatalogError::Validation(reason) => WriteBackError::Rejected {
                    status: 422,
                    body: reason,
                },
                other => WriteBackError::Server {
                    status: 500,
                    body: other.to_string(),
                },
            })
    }
}
