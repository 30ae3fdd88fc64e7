//! Aggregation consumer: formula application, retry and loop resilience.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use catalog_ratings_core::calculation::{
    AggregationError, CalculationMessage, REVIEW_CALCULATION_TOPIC, ZeroCountPolicy,
};
use catalog_ratings_core::catalog::ProductId;
use catalog_ratings_core::event::SerializedEvent;
use catalog_ratings_core::event_bus::{EventBus, EventBusError, EventStream};
use catalog_ratings_core::write_back::WriteBackError;
use catalog_ratings_runtime::{AggregationConsumer, AggregationOutcome, ConsumeError, RetryPolicy};
use catalog_ratings_testing::fixtures::{calculation_event, snapshot};
use catalog_ratings_testing::{InMemoryEventBus, RecordingWriteBack};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(2);

fn fast_retries(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(4))
        .build()
}

fn consumer(
    write_back: &RecordingWriteBack,
) -> (AggregationConsumer, Arc<InMemoryEventBus>, broadcast::Sender<()>) {
    let bus = Arc::new(InMemoryEventBus::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = AggregationConsumer::new(bus.clone(), Arc::new(write_back.clone()), shutdown_rx)
        .with_retry_policy(fast_retries(3))
        .with_reconnect_delay(Duration::from_millis(10));
    (consumer, bus, shutdown_tx)
}

async fn wait_for_calls(write_back: &RecordingWriteBack, count: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while write_back.call_count() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {count} write-back calls, saw {}",
            write_back.call_count()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn first_review_writes_its_rating() {
    let write_back = RecordingWriteBack::new();
    let (consumer, _bus, _shutdown) = consumer(&write_back);

    let message = CalculationMessage::created(ProductId::new(1), snapshot(0.0, 0), 3);
    let outcome = consumer.apply(&message).await;

    assert_eq!(outcome, AggregationOutcome::Applied(3.0));
    assert_eq!(write_back.calls(), vec![(ProductId::new(1), 3.0)]);
}

#[tokio::test]
async fn last_review_deleted_resets_to_zero_by_default() {
    let write_back = RecordingWriteBack::new();
    let (consumer, _bus, _shutdown) = consumer(&write_back);

    let message = CalculationMessage::deleted(ProductId::new(1), snapshot(5.0, 1), 5);
    let outcome = consumer.apply(&message).await;

    assert_eq!(outcome, AggregationOutcome::Applied(0.0));
    assert_eq!(write_back.calls(), vec![(ProductId::new(1), 0.0)]);
}

#[tokio::test]
async fn skip_policy_leaves_average_untouched() {
    let write_back = RecordingWriteBack::new();
    let (consumer, _bus, _shutdown) = consumer(&write_back);
    let consumer = consumer.with_zero_count_policy(ZeroCountPolicy::Skip);

    let message = CalculationMessage::deleted(ProductId::new(1), snapshot(5.0, 1), 5);

    assert_eq!(consumer.apply(&message).await, AggregationOutcome::Skipped);
    assert_eq!(write_back.call_count(), 0);
}

#[tokio::test]
async fn non_finite_average_is_never_written() {
    let write_back = RecordingWriteBack::new();
    let (consumer, _bus, _shutdown) = consumer(&write_back);

    let message = CalculationMessage::created(ProductId::new(2), snapshot(f64::INFINITY, 1), 4);

    assert_eq!(
        consumer.apply(&message).await,
        AggregationOutcome::Failed(ConsumeError::Aggregation(AggregationError::NonFinite {
            product_id: ProductId::new(2)
        }))
    );
    assert_eq!(write_back.call_count(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let write_back = RecordingWriteBack::new();
    write_back.fail_next(WriteBackError::Timeout);
    write_back.fail_next(WriteBackError::Server {
        status: 503,
        body: String::new(),
    });
    let (consumer, _bus, _shutdown) = consumer(&write_back);

    let message = CalculationMessage::updated(ProductId::new(1), snapshot(2.0, 2), 2, 4);
    let outcome = consumer.apply(&message).await;

    assert_eq!(outcome, AggregationOutcome::Applied(3.0));
    assert_eq!(write_back.call_count(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let write_back = RecordingWriteBack::new();
    write_back.fail_always(WriteBackError::Transport("connection refused".to_string()));
    let (consumer, _bus, _shutdown) = consumer(&write_back);

    let message = CalculationMessage::created(ProductId::new(1), snapshot(0.0, 0), 4);
    let outcome = consumer.apply(&message).await;

    assert!(matches!(
        outcome,
        AggregationOutcome::Failed(ConsumeError::WriteBack(WriteBackError::Transport(_)))
    ));
    assert_eq!(write_back.call_count(), 4); // Initial + 3 retries
}

#[tokio::test]
async fn deleted_product_is_not_retried() {
    let write_back = RecordingWriteBack::new();
    write_back.fail_always(WriteBackError::NotFound(ProductId::new(9)));
    let (consumer, _bus, _shutdown) = consumer(&write_back);

    let message = CalculationMessage::created(ProductId::new(9), snapshot(0.0, 0), 4);
    let outcome = consumer.apply(&message).await;

    assert_eq!(
        outcome,
        AggregationOutcome::Failed(ConsumeError::WriteBack(WriteBackError::NotFound(
            ProductId::new(9)
        )))
    );
    assert_eq!(write_back.call_count(), 1);
}

#[tokio::test]
async fn undecodable_payload_is_a_failed_outcome() {
    let write_back = RecordingWriteBack::new();
    let (consumer, _bus, _shutdown) = consumer(&write_back);

    let garbage = SerializedEvent::new("ReviewCalculation.v1".to_string(), b"{}".to_vec(), None);

    assert!(matches!(
        consumer.handle(&garbage).await,
        AggregationOutcome::Failed(ConsumeError::Decode(_))
    ));
    assert_eq!(consumer.health().failed(), 1);
}

#[test]
fn undecodable_payload_counts_as_failed_in_metrics() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let metrics = recorder.handle();
    let write_back = RecordingWriteBack::new();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = AggregationConsumer::new(
        Arc::new(InMemoryEventBus::new()),
        Arc::new(write_back),
        shutdown_rx,
    );
    let garbage = SerializedEvent::new("ReviewCalculation.v1".to_string(), b"{}".to_vec(), None);

    metrics::with_local_recorder(&recorder, || {
        futures::executor::block_on(consumer.handle(&garbage));
    });

    let rendered = metrics.render();
    assert!(rendered.contains("aggregation_decode_errors_total 1"), "{rendered}");
    assert!(rendered.contains("aggregation_failed_total 1"), "{rendered}");
    assert_eq!(consumer.health().failed(), 1);
}

/// Bus whose first subscription yields a fixed script of items, then ends.
/// Later subscriptions never yield.
struct ScriptedBus {
    script: Mutex<Option<Vec<Result<SerializedEvent, EventBusError>>>>,
}

impl EventBus for ScriptedBus {
    fn publish(
        &self,
        _topic: &str,
        _event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn subscribe(
        &self,
        _topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let script = self.script.lock().unwrap().take();
        Box::pin(async move {
            let stream: EventStream = match script {
                Some(items) => Box::pin(futures::stream::iter(items)),
                None => Box::pin(futures::stream::pending()),
            };
            Ok(stream)
        })
    }
}

#[tokio::test]
async fn receive_errors_are_split_from_dropped_messages() {
    let write_back = RecordingWriteBack::new();
    let message = CalculationMessage::created(ProductId::new(3), snapshot(0.0, 0), 4);
    let bus = Arc::new(ScriptedBus {
        script: Mutex::new(Some(vec![
            Err(EventBusError::TransportError("lagged by 2 messages".to_string())),
            Err(EventBusError::DeserializationFailed("not utf-8".to_string())),
            Ok(calculation_event(&message, "req")),
        ])),
    });
    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let consumer = AggregationConsumer::new(bus, Arc::new(write_back.clone()), shutdown_rx)
        .with_reconnect_delay(Duration::from_millis(10));
    let health = consumer.health();
    let handle = consumer.spawn();

    let deadline = tokio::time::Instant::now() + WAIT;
    while health.processed() < 1 {
        assert!(tokio::time::Instant::now() < deadline, "message never processed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(write_back.calls(), vec![(ProductId::new(3), 4.0)]);
    assert_eq!(health.transport_errors(), 1);
    assert_eq!(health.failed(), 1);
    assert_eq!(health.processed(), 1);

    shutdown.send(()).unwrap();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn loop_survives_a_poisoned_message() {
    let write_back = RecordingWriteBack::new();
    write_back.fail_next(WriteBackError::NotFound(ProductId::new(1)));
    let (consumer, bus, shutdown) = consumer(&write_back);
    let health = consumer.health();
    let handle = consumer.spawn();
    assert!(bus.wait_for_subscribers(REVIEW_CALCULATION_TOPIC, 1, WAIT).await);

    let poisoned = CalculationMessage::created(ProductId::new(1), snapshot(0.0, 0), 5);
    let healthy = CalculationMessage::created(ProductId::new(2), snapshot(4.0, 1), 2);
    for message in [poisoned, healthy] {
        bus.publish(REVIEW_CALCULATION_TOPIC, &calculation_event(&message, "req"))
            .await
            .unwrap();
    }

    wait_for_calls(&write_back, 2).await;
    assert_eq!(
        write_back.calls(),
        vec![(ProductId::new(1), 5.0), (ProductId::new(2), 3.0)]
    );
    assert!(health.is_subscribed());

    shutdown.send(()).unwrap();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(!health.is_subscribed());
}

#[tokio::test]
async fn messages_are_processed_in_publish_order() {
    let write_back = RecordingWriteBack::new();
    let (consumer, bus, shutdown) = consumer(&write_back);
    let handle = consumer.spawn();
    assert!(bus.wait_for_subscribers(REVIEW_CALCULATION_TOPIC, 1, WAIT).await);

    let product = ProductId::new(3);
    let mut state = snapshot(0.0, 0);
    let mut expected = Vec::new();
    for rating in [5, 1, 3, 3] {
        let message = CalculationMessage::created(product, state, rating);
        bus.publish(REVIEW_CALCULATION_TOPIC, &calculation_event(&message, "req"))
            .await
            .unwrap();
        let average = catalog_ratings_core::compute_average(&message).unwrap();
        expected.push((product, average));
        state = snapshot(average, state.count + 1);
    }

    wait_for_calls(&write_back, expected.len()).await;
    assert_eq!(write_back.calls(), expected);

    shutdown.send(()).unwrap();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn consumer_resubscribes_after_connection_loss() {
    let write_back = RecordingWriteBack::new();
    let (consumer, bus, shutdown) = consumer(&write_back);
    let health = consumer.health();
    let handle = consumer.spawn();
    assert!(bus.wait_for_subscribers(REVIEW_CALCULATION_TOPIC, 1, WAIT).await);

    bus.disconnect_all();

    // Published while disconnected: lost
    let lost = CalculationMessage::created(ProductId::new(1), snapshot(0.0, 0), 1);
    bus.publish(REVIEW_CALCULATION_TOPIC, &calculation_event(&lost, "lost"))
        .await
        .unwrap();

    assert!(bus.wait_for_subscribers(REVIEW_CALCULATION_TOPIC, 1, WAIT).await);
    let delivered = CalculationMessage::created(ProductId::new(2), snapshot(0.0, 0), 4);
    bus.publish(REVIEW_CALCULATION_TOPIC, &calculation_event(&delivered, "ok"))
        .await
        .unwrap();

    wait_for_calls(&write_back, 1).await;
    assert_eq!(write_back.calls(), vec![(ProductId::new(2), 4.0)]);
    assert_eq!(health.reconnects(), 1);

    shutdown.send(()).unwrap();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn subscribe_failures_are_retried() {
    let write_back = RecordingWriteBack::new();
    let (consumer, bus, shutdown) = consumer(&write_back);
    bus.fail_subscribes(true);
    let handle = consumer.spawn();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(bus.subscriber_count(REVIEW_CALCULATION_TOPIC), 0);

    bus.fail_subscribes(false);
    assert!(bus.wait_for_subscribers(REVIEW_CALCULATION_TOPIC, 1, WAIT).await);

    shutdown.send(()).unwrap();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
}
