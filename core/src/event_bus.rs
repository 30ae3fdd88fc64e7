//! Event bus abstraction for the review calculation channel.
//!
//! The review write path publishes to the bus and the aggregation consumer
//! subscribes to it. Both receive the bus as an injected `Arc<dyn EventBus>`
//! acquired once at service startup.
//!
//! # Delivery Semantics
//!
//! The contract is deliberately weak, matching a plain pub/sub channel:
//!
//! - **Per-connection order**: a single subscription sees messages in publish order
//! - **At-most-once**: a subscriber that is not connected at publish time never
//!   sees the message; nothing is persisted or redelivered
//! - **No cross-producer order**: concurrent publishers interleave arbitrarily
//!
//! `publish` resolves as soon as the channel accepts the message. It never
//! waits for a consumer to process it.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `catalog-ratings-testing` (tests, single process)
//! - `RedisEventBus` in `catalog-ratings-redis` (production)
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_ratings_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! let mut stream = event_bus.subscribe(&["review-calculation"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(event) => handle(event).await,
//!         Err(e) => tracing::error!(error = %e, "Event stream error"),
//!     }
//! }
//! ```

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received payload could not be decoded
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of events from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Publish/subscribe channel.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the trait stays usable as
/// `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the channel rejects the event
    /// or is unreachable.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// The returned stream yields events published after the subscription is
    /// established. It ends when the underlying connection is lost.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
