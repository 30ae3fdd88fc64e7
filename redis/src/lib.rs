//! Redis pub/sub event bus for the catalog ratings pipeline.
//!
//! This crate provides the production [`EventBus`] used by both services. The
//! review write path publishes calculation messages with `PUBLISH`; the
//! aggregation consumer holds a `SUBSCRIBE` connection.
//!
//! # Delivery Semantics
//!
//! **At-most-once**, exactly what Redis pub/sub gives:
//! - Only subscribers connected at `PUBLISH` time receive a message
//! - Nothing is persisted; a dropped subscriber loses whatever was published
//!   while it reconnects
//! - A single subscription connection sees messages in publish order
//!
//! When the subscription connection drops the stream ends, and the consumer
//! is expected to resubscribe.
//!
//! # Wire Format
//!
//! Each message is a JSON envelope:
//!
//! ```json
//! {
//!   "pattern": "review-calculation",
//!   "type": "ReviewCalculation.v1",
//!   "data": { "productId": 1, "averageRating": 4.0, "originalCount": 2, "countChange": 1, "ratingChange": 5 },
//!   "metadata": { "correlation_id": "..." }
//! }
//! ```
//!
//! `pattern` is the channel name, matching NestJS-style Redis transport
//! messages, so producers that only send `{pattern, data}` are understood too.
//!
//! # Example
//!
//! ```no_run
//! use catalog_ratings_redis::RedisEventBus;
//! use catalog_ratings_core::event_bus::EventBus;
//! use catalog_ratings_core::event::SerializedEvent;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedisEventBus::connect("redis://localhost:6379").await?;
//!
//! let mut stream = event_bus.subscribe(&["review-calculation"]).await?;
//!
//! let event = SerializedEvent::new("Ping.v1".to_string(), b"{}".to_vec(), None);
//! event_bus.publish("review-calculation", &event).await?;
//!
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(event) => println!("Received: {}", event.event_type),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use catalog_ratings_core::event::SerializedEvent;
use catalog_ratings_core::event_bus::{EventBus, EventBusError, EventStream};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default capacity of the channel between the subscription task and the stream.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default bound on a single `PUBLISH` round trip.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// JSON envelope published on a Redis channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Envelope {
    pattern: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

/// Encode an event for `PUBLISH` on `topic`.
///
/// # Errors
///
/// Returns [`EventBusError::PublishFailed`] if the event body is not JSON.
pub fn encode_envelope(topic: &str, event: &SerializedEvent) -> Result<String, EventBusError> {
    let publish_failed = |reason: String| EventBusError::PublishFailed {
        topic: topic.to_string(),
        reason,
    };

    let data = serde_json::from_slice(&event.data)
        .map_err(|e| publish_failed(format!("Event body is not JSON: {e}")))?;

    let envelope = Envelope {
        pattern: topic.to_string(),
        event_type: Some(event.event_type.clone()),
        data,
        metadata: event.metadata.clone(),
    };

    serde_json::to_string(&envelope)
        .map_err(|e| publish_failed(format!("Failed to serialize envelope: {e}")))
}

/// Decode a received channel payload.
///
/// # Errors
///
/// Returns [`EventBusError::DeserializationFailed`] if the payload is not an
/// envelope.
pub fn decode_envelope(payload: &[u8]) -> Result<SerializedEvent, EventBusError> {
    let envelope: Envelope = serde_json::from_slice(payload).map_err(|e| {
        EventBusError::DeserializationFailed(format!("Invalid message envelope: {e}"))
    })?;

    let data = serde_json::to_vec(&envelope.data)
        .map_err(|e| EventBusError::DeserializationFailed(e.to_string()))?;

    Ok(SerializedEvent::new(
        envelope.event_type.unwrap_or(envelope.pattern),
        data,
        envelope.metadata,
    ))
}

/// Redis pub/sub event bus.
///
/// Publishing goes through a shared [`ConnectionManager`], which reconnects
/// on its own. Each `subscribe` opens a dedicated pub/sub connection.
///
/// # Example
///
/// ```no_run
/// use catalog_ratings_redis::RedisEventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedisEventBus::builder()
///     .redis_url("redis://localhost:6379")
///     .buffer_size(256)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisEventBus {
    client: Client,
    conn_manager: ConnectionManager,
    buffer_size: usize,
    publish_timeout: Duration,
}

impl RedisEventBus {
    /// Connect with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the URL is invalid or
    /// Redis is unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self, EventBusError> {
        Self::builder().redis_url(redis_url).build().await
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> RedisEventBusBuilder {
        RedisEventBusBuilder::default()
    }
}

/// Builder for configuring a [`RedisEventBus`].
#[derive(Debug, Clone)]
pub struct RedisEventBusBuilder {
    redis_url: String,
    buffer_size: usize,
    publish_timeout: Duration,
}

impl Default for RedisEventBusBuilder {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

impl RedisEventBusBuilder {
    /// Redis connection URL (default: `redis://localhost:6379`).
    #[must_use]
    pub fn redis_url(mut self, redis_url: impl Into<String>) -> Self {
        self.redis_url = redis_url.into();
        self
    }

    /// Capacity of each subscription's buffer (default: 1000).
    ///
    /// A slow consumer applies backpressure to its own subscription task;
    /// Redis drops the connection if its output buffer limit is exceeded.
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Bound on a single `PUBLISH` round trip (default: 2s).
    ///
    /// A publish that gets no reply in time fails with
    /// [`EventBusError::PublishFailed`].
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Connect and build the event bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the URL is invalid or
    /// Redis is unreachable.
    pub async fn build(self) -> Result<RedisEventBus, EventBusError> {
        let client = Client::open(self.redis_url.as_str()).map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            EventBusError::ConnectionFailed(format!(
                "Failed to create Redis connection manager: {e}"
            ))
        })?;

        tracing::info!(
            buffer_size = self.buffer_size,
            publish_timeout_ms = u64::try_from(self.publish_timeout.as_millis()).unwrap_or(u64::MAX),
            "Connected to Redis"
        );

        Ok(RedisEventBus {
            client,
            conn_manager,
            buffer_size: self.buffer_size.max(1),
            publish_timeout: self.publish_timeout,
        })
    }
}

impl EventBus for RedisEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = encode_envelope(&topic, event);
        let event_type = event.event_type.clone();
        let mut conn = self.conn_manager.clone();
        let publish_timeout = self.publish_timeout;

        Box::pin(async move {
            let payload = payload?;

            let reply: Result<redis::RedisResult<i64>, _> =
                tokio::time::timeout(publish_timeout, conn.publish(&topic, payload)).await;
            let reply = reply.map_err(|_| {
                tracing::error!(topic = %topic, "Timed out publishing event");
                EventBusError::PublishFailed {
                    topic: topic.clone(),
                    reason: format!("no reply within {publish_timeout:?}"),
                }
            })?;

            let receivers = reply.map_err(|e| {
                tracing::error!(topic = %topic, error = %e, "Failed to publish event");
                EventBusError::PublishFailed {
                    topic: topic.clone(),
                    reason: e.to_string(),
                }
            })?;

            if receivers == 0 {
                tracing::debug!(topic = %topic, event_type = %event_type, "Event published with no subscribers");
            } else {
                tracing::debug!(topic = %topic, event_type = %event_type, receivers, "Event published");
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let client = self.client.clone();
        let buffer_size = self.buffer_size;

        Box::pin(async move {
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                topics: topics.clone(),
                reason,
            };

            let mut pubsub = client
                .get_async_pubsub()
                .await
                .map_err(|e| subscription_failed(format!("Failed to open pub/sub connection: {e}")))?;

            for topic in &topics {
                pubsub
                    .subscribe(topic.as_str())
                    .await
                    .map_err(|e| subscription_failed(format!("SUBSCRIBE {topic} failed: {e}")))?;
            }

            tracing::info!(topics = ?topics, buffer_size, "Subscribed to Redis channels");

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            // The task owns the pub/sub connection; it ends when Redis drops
            // the connection or the stream is dropped.
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut messages = pubsub.into_on_message();
                while let Some(message) = messages.next().await {
                    let result = decode_envelope(message.get_payload_bytes());
                    if let Err(e) = &result {
                        tracing::warn!(
                            channel = %message.get_channel_name(),
                            error = %e,
                            "Undecodable message on channel"
                        );
                    }
                    if tx.send(result).await.is_err() {
                        tracing::debug!("Subscription stream dropped, closing pub/sub connection");
                        break;
                    }
                }

                tracing::debug!("Redis pub/sub connection closed");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn redis_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedisEventBus>();
        assert_sync::<RedisEventBus>();
    }

    #[test]
    fn builder_bounds_publish_by_default() {
        let builder = RedisEventBus::builder();
        assert_eq!(builder.publish_timeout, DEFAULT_PUBLISH_TIMEOUT);

        let builder = builder.timeout(Duration::from_millis(250));
        assert_eq!(builder.publish_timeout, Duration::from_millis(250));
    }

    #[test]
    fn envelope_carries_channel_type_and_metadata() {
        let event = SerializedEvent::new(
            "ReviewCalculation.v1".to_string(),
            br#"{"productId":1,"countChange":1}"#.to_vec(),
            Some(serde_json::json!({ "correlation_id": "req-9" })),
        );

        let payload = encode_envelope("review-calculation", &event).unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(json["pattern"], "review-calculation");
        assert_eq!(json["type"], "ReviewCalculation.v1");
        assert_eq!(json["data"]["productId"], 1);
        assert_eq!(json["metadata"]["correlation_id"], "req-9");

        let decoded = decode_envelope(payload.as_bytes()).unwrap();
        assert_eq!(decoded.event_type, "ReviewCalculation.v1");
        assert_eq!(decoded.metadata_str("correlation_id"), Some("req-9"));
    }

    #[test]
    fn bare_pattern_data_message_is_accepted() {
        let payload = br#"{"pattern":"review-calculation","data":{"productId":3}}"#;

        let decoded = decode_envelope(payload).unwrap();

        assert_eq!(decoded.event_type, "review-calculation");
        assert_eq!(decoded.metadata, None);
        let data: serde_json::Value = serde_json::from_slice(&decoded.data).unwrap();
        assert_eq!(data["productId"], 3);
    }

    #[test]
    fn non_json_body_cannot_be_published() {
        let event = SerializedEvent::new("Raw.v1".to_string(), vec![0xff, 0x00], None);
        assert!(matches!(
            encode_envelope("t", &event),
            Err(EventBusError::PublishFailed { .. })
        ));
    }

    #[test]
    fn garbage_payload_is_a_deserialization_error() {
        assert!(matches!(
            decode_envelope(b"not json"),
            Err(EventBusError::DeserializationFailed(_))
        ));
    }

    #[test]
    fn builder_defaults() {
        let builder = RedisEventBus::builder();
        assert_eq!(builder.redis_url, "redis://localhost:6379");
        assert_eq!(builder.buffer_size, DEFAULT_BUFFER_SIZE);
    }
}
