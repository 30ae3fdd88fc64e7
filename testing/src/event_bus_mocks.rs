//! In-memory event bus with pub/sub semantics.
//!
//! Mirrors the production channel closely enough for pipeline tests:
//! - Messages reach only subscribers connected at publish time
//! - Each subscription sees messages in publish order
//! - [`InMemoryEventBus::disconnect_all`] ends every open stream, like a
//!   dropped broker connection
//!
//! Every publish is also kept in a log so tests can assert on what the write
//! path emitted without subscribing.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use catalog_ratings_core::event::{Event, SerializedEvent};
use catalog_ratings_core::event_bus::{EventBus, EventBusError, EventStream};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const TOPIC_CAPACITY: usize = 1024;

/// Published message as recorded by [`InMemoryEventBus`].
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedEvent {
    /// Channel it was published to
    pub topic: String,
    /// The event itself
    pub event: SerializedEvent,
}

/// In-memory [`EventBus`].
///
/// Clones share the same channels and log.
///
/// # Example
///
/// ```
/// use catalog_ratings_testing::InMemoryEventBus;
/// use catalog_ratings_core::event::SerializedEvent;
/// use catalog_ratings_core::event_bus::EventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let event = SerializedEvent::new("Ping.v1".to_string(), b"{}".to_vec(), None);
///
/// // No subscriber yet: accepted but delivered to nobody
/// bus.publish("pings", &event).await?;
/// assert_eq!(bus.published().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<SerializedEvent>>>>,
    published: Arc<Mutex<Vec<PublishedEvent>>>,
    fail_publishes: Arc<AtomicBool>,
    fail_subscribes: Arc<AtomicBool>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail with `PublishFailed`.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Make every following subscribe fail with `SubscriptionFailed`.
    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// All accepted publishes, in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().unwrap().clone()
    }

    /// Accepted publishes on `topic`, decoded as `E`.
    ///
    /// Events that do not decode are left out.
    #[must_use]
    pub fn published_as<E>(&self, topic: &str) -> Vec<E>
    where
        E: Event + serde::de::DeserializeOwned,
    {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.topic == topic)
            .filter_map(|p| p.event.decode::<E>().ok())
            .collect()
    }

    /// Metadata of every accepted publish, in order.
    #[must_use]
    pub fn published_metadata(&self) -> Vec<Option<Value>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.event.metadata.clone())
            .collect()
    }

    /// Clear the publish log.
    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Wait until `topic` has at least `count` subscriptions.
    ///
    /// Returns `false` if that does not happen within `timeout`.
    pub async fn wait_for_subscribers(&self, topic: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.subscriber_count(topic) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.subscriber_count(topic) >= count
    }

    /// End every open subscription stream.
    ///
    /// Later subscribes get fresh channels.
    pub fn disconnect_all(&self) {
        self.topics.lock().unwrap().clear();
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<SerializedEvent> {
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();

        Box::pin(async move {
            if self.fail_publishes.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "publishing disabled by test".to_string(),
                });
            }

            self.published.lock().unwrap().push(PublishedEvent {
                topic: topic.clone(),
                event: event.clone(),
            });

            // No receivers is not an error: the message is simply lost
            let sender = self.topics.lock().unwrap().get(&topic).cloned();
            if let Some(sender) = sender {
                let _ = sender.send(event);
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();

        Box::pin(async move {
            if self.fail_subscribes.load(Ordering::SeqCst) {
                return Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "subscribing disabled by test".to_string(),
                });
            }

            let (tx, mut rx) = mpsc::unbounded_channel();
            for topic in &topics {
                let mut receiver = self.sender(topic).subscribe();
                let tx = tx.clone();
                tokio::spawn(async move {
                    loop {
                        let item = match receiver.recv().await {
                            Ok(event) => Ok(event),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(
                                EventBusError::TransportError(format!("lagged by {skipped} messages")),
                            ),
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        if tx.send(item).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
