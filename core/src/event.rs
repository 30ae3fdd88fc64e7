//! Event trait and the serialized carrier passed through the event bus.
//!
//! Events crossing the channel are JSON. The wire contract of
//! `review-calculation` is a camelCase JSON object, so the bytes in
//! [`SerializedEvent::data`] are exactly that object and any consumer that
//! speaks JSON can read them.
//!
//! # Example
//!
//! ```
//! use catalog_ratings_core::event::{Event, SerializedEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! struct PriceChanged {
//!     product_id: u64,
//!     price: f64,
//! }
//!
//! impl Event for PriceChanged {
//!     fn event_type(&self) -> &'static str {
//!         "PriceChanged.v1"
//!     }
//! }
//!
//! let event = PriceChanged { product_id: 1, price: 9.5 };
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "PriceChanged.v1");
//! assert_eq!(serialized.decode::<PriceChanged>().unwrap(), event);
//! ```

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// A fact that can be published on the event bus.
///
/// The `event_type()` string is stable and carries a version suffix, e.g.
/// `"ReviewCalculation.v1"`.
pub trait Event: Send + Sync + 'static {
    /// Stable, versioned type name.
    fn event_type(&self) -> &'static str;

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if serialization fails.
    fn to_json(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are not a valid
    /// encoding of this type.
    fn from_json(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// An event ready for transport.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "ReviewCalculation.v1").
    pub event_type: String,

    /// JSON-encoded event body.
    pub data: Vec<u8>,

    /// Optional metadata.
    ///
    /// Common fields:
    /// - `correlation_id`: request that triggered the event
    /// - `published_at`: RFC 3339 timestamp set by the publisher
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Serialize an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E>(event: &E, metadata: Option<serde_json::Value>) -> Result<Self, EventError>
    where
        E: Event + Serialize,
    {
        Ok(Self::new(
            event.event_type().to_string(),
            event.to_json()?,
            metadata,
        ))
    }

    /// Decode the body into `E`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the body does not decode.
    pub fn decode<E>(&self) -> Result<E, EventError>
    where
        E: Event + DeserializeOwned,
    {
        E::from_json(&self.data)
    }

    /// Metadata field as a string, if present.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(serde_json::Value::as_str)
    }
}
