//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by resource.

pub mod health;
pub mod private_products;
pub mod products;
pub mod reviews;

pub use health::{health_check, metrics};
