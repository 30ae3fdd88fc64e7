//! In-process catalog store.
//!
//! Backs the product service when no external store is configured and is the
//! store every integration test runs against. `rating_count` is derived from
//! the reviews held for a product each time a product is read.

use async_trait::async_trait;
use catalog_ratings_core::catalog::{
    CatalogError, CatalogStore, NewProduct, NewReview, Product, ProductId, ProductUpdate, Review,
    ReviewId, validate_rating,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredProduct {
    name: String,
    description: String,
    price: f64,
    average_rating: f64,
}

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<ProductId, StoredProduct>,
    reviews: BTreeMap<ReviewId, Review>,
    next_product_id: u64,
    next_review_id: u64,
}

impl State {
    fn rating_count(&self, product_id: ProductId) -> u64 {
        self.reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .count() as u64
    }

    fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let stored = self
            .products
            .get(&id)
            .ok_or(CatalogError::ProductNotFound(id))?;

        Ok(Product {
            id,
            name: stored.name.clone(),
            description: stored.description.clone(),
            price: stored.price,
            average_rating: stored.average_rating,
            rating_count: self.rating_count(id),
        })
    }

    fn review(&self, product_id: ProductId, review_id: ReviewId) -> Result<&Review, CatalogError> {
        self.reviews
            .get(&review_id)
            .filter(|r| r.product_id == product_id)
            .ok_or(CatalogError::ReviewNotFound {
                product_id,
                review_id,
            })
    }
}

/// Catalog store held in memory behind a `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    state: RwLock<State>,
}

impl InMemoryCatalogStore {
    /// Create an empty store. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_price(price: f64) -> Result<f64, CatalogError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(CatalogError::Validation(format!(
            "price must be a non-negative number, got {price}"
        )))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        let state = self.state.read().await;
        state
            .products
            .keys()
            .map(|id| state.product(*id))
            .collect()
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.state.read().await.product(id)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        if product.name.trim().is_empty() {
            return Err(CatalogError::Validation("name must not be empty".to_string()));
        }
        let price = validate_price(product.price)?;

        let mut state = self.state.write().await;
        state.next_product_id += 1;
        let id = ProductId::new(state.next_product_id);
        state.products.insert(
            id,
            StoredProduct {
                name: product.name,
                description: product.description,
                price,
                average_rating: 0.0,
            },
        );
        state.product(id)
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, CatalogError> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CatalogError::Validation("name must not be empty".to_string()));
        }
        let price = update.price.map(validate_price).transpose()?;

        let mut state = self.state.write().await;
        let stored = state
            .products
            .get_mut(&id)
            .ok_or(CatalogError::ProductNotFound(id))?;

        if let Some(name) = update.name {
            stored.name = name;
        }
        if let Some(description) = update.description {
            stored.description = description;
        }
        if let Some(price) = price {
            stored.price = price;
        }
        state.product(id)
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state
            .products
            .remove(&id)
            .ok_or(CatalogError::ProductNotFound(id))?;
        state.reviews.retain(|_, r| r.product_id != id);
        Ok(())
    }

    async fn set_average_rating(
        &self,
        id: ProductId,
        average_rating: f64,
    ) -> Result<Product, CatalogError> {
        let mut state = self.state.write().await;
        state
            .products
            .get_mut(&id)
            .ok_or(CatalogError::ProductNotFound(id))?
            .average_rating = average_rating;
        state.product(id)
    }

    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, CatalogError> {
        let state = self.state.read().await;
        if !state.products.contains_key(&product_id) {
            return Err(CatalogError::ProductNotFound(product_id));
        }
        Ok(state
            .reviews
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn get_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
    ) -> Result<Review, CatalogError> {
        self.state
            .read()
            .await
            .review(product_id, review_id)
            .cloned()
    }

    async fn create_review(
        &self,
        product_id: ProductId,
        review: NewReview,
    ) -> Result<Review, CatalogError> {
        let rating = validate_rating(review.rating)?;

        let mut state = self.state.write().await;
        if !state.products.contains_key(&product_id) {
            return Err(CatalogError::ProductNotFound(product_id));
        }

        state.next_review_id += 1;
        let review = Review {
            id: ReviewId::new(state.next_review_id),
            product_id,
            first_name: review.first_name,
            last_name: review.last_name,
            review_text: review.review_text,
            rating,
        };
        state.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn save_review(&self, review: Review) -> Result<Review, CatalogError> {
        validate_rating(review.rating)?;

        let mut state = self.state.write().await;
        state.review(review.product_id, review.id)?;
        state.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn delete_review(
        &self,
        product_id: ProductId,
        review_id: ReviewId,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state.review(product_id, review_id)?;
        state.reviews.remove(&review_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        drop(self.state.read().await);
        Ok(())
    }
}
