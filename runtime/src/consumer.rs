//! Aggregation consumer: subscribe to `review-calculation`, compute averages,
//! write them back.
//!
//! # Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     subscribe(topic)
//!     for each message (one at a time, to completion):
//!         decode → ZeroCountPolicy::resolve → write_back with retry
//!         log and count failures, never stop
//!     receive error (not a message): count as transport error, keep reading
//!     stream ended or subscribe failed:
//!         wait reconnect_delay, resubscribe
//! }
//! ```
//!
//! Messages published while the consumer is disconnected are lost. The channel
//! is at-most-once and nothing here tries to recover them.
//!
//! # Example
//!
//! ```rust,ignore
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//!
//! let handle = AggregationConsumer::new(event_bus, write_back, shutdown_rx)
//!     .with_retry_policy(RetryPolicy::default())
//!     .with_zero_count_policy(ZeroCountPolicy::ResetToZero)
//!     .spawn();
//!
//! // on Ctrl+C
//! let _ = shutdown_tx.send(());
//! handle.await?;
//! ```

use crate::health::ConsumerHealth;
use crate::metrics::AggregationMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use catalog_ratings_core::calculation::{
    AggregationError, CalculationMessage, REVIEW_CALCULATION_TOPIC, ZeroCountPolicy,
};
use catalog_ratings_core::event::SerializedEvent;
use catalog_ratings_core::event_bus::{EventBus, EventBusError};
use catalog_ratings_core::write_back::{WriteBack, WriteBackError};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Default wait before resubscribing.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Why a message produced no write-back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsumeError {
    /// Payload is not a calculation message
    #[error("Undecodable calculation message: {0}")]
    Decode(String),

    /// Arithmetic could not produce an average
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// Write-back failed permanently or ran out of retries
    #[error(transparent)]
    WriteBack(#[from] WriteBackError),
}

/// Result of processing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    /// The average was written back
    Applied(f64),
    /// The zero-count policy chose not to write back
    Skipped,
    /// Nothing was written; the loop moves on
    Failed(ConsumeError),
}

/// Consumer of calculation messages.
pub struct AggregationConsumer {
    topic: String,
    event_bus: Arc<dyn EventBus>,
    write_back: Arc<dyn WriteBack>,
    retry_policy: RetryPolicy,
    zero_count_policy: ZeroCountPolicy,
    reconnect_delay: Duration,
    shutdown: broadcast::Receiver<()>,
    health: ConsumerHealth,
}

impl AggregationConsumer {
    /// Create a consumer of `review-calculation` with default policies.
    #[must_use]
    pub fn new(
        event_bus: Arc<dyn EventBus>,
        write_back: Arc<dyn WriteBack>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            topic: REVIEW_CALCULATION_TOPIC.to_string(),
            event_bus,
            write_back,
            retry_policy: RetryPolicy::default(),
            zero_count_policy: ZeroCountPolicy::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            shutdown,
            health: ConsumerHealth::new(),
        }
    }

    /// Subscribe to a different channel.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the write-back retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set what happens when the last review of a product is deleted.
    #[must_use]
    pub const fn with_zero_count_policy(mut self, policy: ZeroCountPolicy) -> Self {
        self.zero_count_policy = policy;
        self
    }

    /// Set the wait before resubscribing.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Report subscription state into an existing tracker.
    #[must_use]
    pub fn with_health(mut self, health: ConsumerHealth) -> Self {
        self.health = health;
        self
    }

    /// Subscription state tracker shared with this consumer.
    #[must_use]
    pub fn health(&self) -> ConsumerHealth {
        self.health.clone()
    }

    /// Spawn the consumer loop as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the subscribe-process-reconnect loop until shutdown.
    pub async fn run(&mut self) {
        info!(
            topic = %self.topic,
            zero_count_policy = %self.zero_count_policy,
            max_retries = self.retry_policy.max_retries,
            "Aggregation consumer started"
        );

        let mut first_subscription = true;
        loop {
            let event_bus = Arc::clone(&self.event_bus);
            let topics = [self.topic.as_str()];

            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(topic = %self.topic, "Aggregation consumer received shutdown signal");
                    break;
                }
                result = event_bus.subscribe(&topics) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    if !first_subscription {
                        self.health.record_reconnect();
                        AggregationMetrics::record_reconnect();
                    }
                    first_subscription = false;
                    self.set_subscribed(true);
                    info!(topic = %self.topic, "Subscribed to calculation channel");

                    let shutdown = self.process_stream(&mut stream).await;
                    self.set_subscribed(false);
                    if shutdown {
                        break;
                    }

                    warn!(
                        topic = %self.topic,
                        delay_ms = duration_ms(self.reconnect_delay),
                        "Calculation stream ended, reconnecting"
                    );
                }
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        error = %e,
                        delay_ms = duration_ms(self.reconnect_delay),
                        "Failed to subscribe to calculation channel, retrying"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(topic = %self.topic, "Aggregation consumer received shutdown signal");
                    break;
                }
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(topic = %self.topic, "Aggregation consumer stopped");
    }

    /// Process messages until the stream ends or shutdown is signalled.
    ///
    /// Returns `true` on shutdown.
    async fn process_stream<S>(&mut self, stream: &mut S) -> bool
    where
        S: Stream<Item = Result<SerializedEvent, EventBusError>> + Unpin + Send,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(topic = %self.topic, "Aggregation consumer received shutdown signal during processing");
                    return true;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        self.handle(&event).await;
                    }
                    Some(Err(EventBusError::DeserializationFailed(reason))) => {
                        AggregationMetrics::record_decode_error();
                        AggregationMetrics::record_failed();
                        self.health.record_failed();
                        error!(topic = %self.topic, error = %reason, "Undecodable calculation message dropped");
                    }
                    Some(Err(e)) => {
                        AggregationMetrics::record_transport_error();
                        self.health.record_transport_error();
                        error!(topic = %self.topic, error = %e, "Error receiving calculation message");
                    }
                    None => return false,
                },
            }
        }
    }

    /// Decode and apply one message.
    pub async fn handle(&self, event: &SerializedEvent) -> AggregationOutcome {
        AggregationMetrics::record_consume();

        let outcome = match event.decode::<CalculationMessage>() {
            Ok(message) => self.apply(&message).await,
            Err(e) => {
                AggregationMetrics::record_decode_error();
                AggregationMetrics::record_failed();
                AggregationOutcome::Failed(ConsumeError::Decode(e.to_string()))
            }
        };

        let correlation_id = event.metadata_str("correlation_id").unwrap_or("-");
        match &outcome {
            AggregationOutcome::Applied(_) | AggregationOutcome::Skipped => {
                self.health.record_processed();
            }
            AggregationOutcome::Failed(e) => {
                self.health.record_failed();
                error!(correlation_id, error = %e, "Calculation message dropped");
            }
        }
        outcome
    }

    /// Compute the new average for `message` and write it back.
    pub async fn apply(&self, message: &CalculationMessage) -> AggregationOutcome {
        let product_id = message.product_id;

        let average = match self.zero_count_policy.resolve(message) {
            Ok(Some(average)) => average,
            Ok(None) => {
                AggregationMetrics::record_skipped();
                info!(
                    product_id = %product_id,
                    "Last review removed, leaving stored average untouched"
                );
                return AggregationOutcome::Skipped;
            }
            Err(e) => {
                AggregationMetrics::record_failed();
                return AggregationOutcome::Failed(e.into());
            }
        };

        let write_back = Arc::clone(&self.write_back);
        let result = retry_with_predicate(
            &self.retry_policy,
            || {
                let write_back = Arc::clone(&write_back);
                async move { write_back.write_back(product_id, average).await }
            },
            WriteBackError::is_transient,
        )
        .await;

        match result {
            Ok(_) => {
                AggregationMetrics::record_applied();
                info!(
                    product_id = %product_id,
                    average_rating = average,
                    count_change = message.count_change,
                    "Average rating written back"
                );
                AggregationOutcome::Applied(average)
            }
            Err(e) => {
                AggregationMetrics::record_failed();
                AggregationOutcome::Failed(e.into())
            }
        }
    }

    fn set_subscribed(&self, subscribed: bool) {
        self.health.set_subscribed(subscribed);
        AggregationMetrics::record_subscribed(subscribed);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
