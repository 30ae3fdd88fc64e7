//! Axum HTTP surface for the catalog ratings pipeline.
//!
//! Two routers are built here:
//!
//! - [`catalog_router`]: the product service. Public product and review
//!   routes, the private write-back route `PUT /private/products/:id`,
//!   `/health` and `/metrics`.
//! - [`ops_router`]: `/health` and `/metrics` only, served by the review
//!   processor next to its aggregation consumer.
//!
//! # Request Flow
//!
//! 1. The trace layer and the correlation-id middleware open the request span
//! 2. The handler extracts path, body and [`CorrelationId`]
//! 3. Catalog reads and product mutations go straight to the store
//! 4. Review mutations go through the review write path, which publishes a
//!    calculation message once the store accepted the change
//! 5. [`CatalogError`](catalog_ratings_core::CatalogError)s map to HTTP
//!    statuses through [`AppError`]

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::CorrelationId;
pub use middleware::CORRELATION_ID_HEADER;
pub use router::{catalog_router, ops_router};
pub use state::{AppState, OpsState};
