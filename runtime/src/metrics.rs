//! Prometheus metrics for the ratings pipeline.
//!
//! Both services install the recorder once at startup and serve the rendered
//! output on their own `/metrics` route:
//! - Review write path publishes
//! - Aggregation consumer outcomes
//! - Write-back calls and retries
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_ratings_runtime::metrics::PrometheusRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = PrometheusRecorder::new();
//! recorder.install()?;
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the global Prometheus recorder and renders its output.
#[derive(Default)]
pub struct PrometheusRecorder {
    handle: Option<PrometheusHandle>,
}

impl PrometheusRecorder {
    /// Create an uninstalled recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves [`handle`](Self::handle) empty.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Handle for rendering, once installed.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Take ownership of the handle, e.g. to place it in HTTP state.
    #[must_use]
    pub fn into_handle(self) -> Option<PrometheusHandle> {
        self.handle
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Review write path
    describe_counter!(
        "review_calculation_published_total",
        "Calculation messages published by the review write path"
    );
    describe_counter!(
        "review_calculation_publish_errors_total",
        "Calculation messages the channel rejected"
    );
    describe_histogram!(
        "review_calculation_publish_duration_seconds",
        "Time taken to publish a calculation message"
    );

    // Aggregation consumer
    describe_counter!(
        "aggregation_messages_consumed_total",
        "Calculation messages received by the aggregation consumer"
    );
    describe_counter!(
        "aggregation_decode_errors_total",
        "Received messages that could not be decoded"
    );
    describe_counter!(
        "aggregation_transport_errors_total",
        "Receive errors on the subscription that carried no message"
    );
    describe_counter!(
        "aggregation_applied_total",
        "Averages computed and written back"
    );
    describe_counter!(
        "aggregation_skipped_total",
        "Messages skipped by the zero-count policy"
    );
    describe_counter!(
        "aggregation_failed_total",
        "Messages whose average could not be computed or persisted"
    );
    describe_counter!(
        "aggregation_reconnects_total",
        "Times the consumer re-established its subscription"
    );
    describe_gauge!(
        "aggregation_subscribed",
        "Whether the consumer currently holds a subscription (0 or 1)"
    );

    // Write-back
    describe_counter!(
        "write_back_requests_total",
        "Write-back calls issued, including retries"
    );
    describe_counter!(
        "write_back_errors_total",
        "Write-back calls that failed"
    );
    describe_histogram!(
        "write_back_duration_seconds",
        "Latency of a single write-back call"
    );

    // Retry
    describe_counter!(
        "retry_attempts_total",
        "Total number of retry attempts"
    );
    describe_counter!(
        "retry_successes_total",
        "Total number of successful retries"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of retry attempts that exhausted max retries"
    );
}

/// Review write path metrics recorder.
pub struct PublishMetrics;

impl PublishMetrics {
    /// Record a successful publish.
    pub fn record_publish(duration: Duration) {
        counter!("review_calculation_published_total").increment(1);
        histogram!("review_calculation_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a rejected publish.
    pub fn record_publish_error() {
        counter!("review_calculation_publish_errors_total").increment(1);
    }
}

/// Aggregation consumer metrics recorder.
pub struct AggregationMetrics;

impl AggregationMetrics {
    /// Record a received message.
    pub fn record_consume() {
        counter!("aggregation_messages_consumed_total").increment(1);
    }

    /// Record an undecodable message.
    pub fn record_decode_error() {
        counter!("aggregation_decode_errors_total").increment(1);
    }

    /// Record a receive error that carried no message.
    pub fn record_transport_error() {
        counter!("aggregation_transport_errors_total").increment(1);
    }

    /// Record a persisted average.
    pub fn record_applied() {
        counter!("aggregation_applied_total").increment(1);
    }

    /// Record a skipped message.
    pub fn record_skipped() {
        counter!("aggregation_skipped_total").increment(1);
    }

    /// Record a failed message.
    pub fn record_failed() {
        counter!("aggregation_failed_total").increment(1);
    }

    /// Record a resubscription.
    pub fn record_reconnect() {
        counter!("aggregation_reconnects_total").increment(1);
    }

    /// Record subscription state.
    pub fn record_subscribed(subscribed: bool) {
        gauge!("aggregation_subscribed").set(if subscribed { 1.0 } else { 0.0 });
    }
}

/// Write-back metrics recorder.
pub struct WriteBackMetrics;

impl WriteBackMetrics {
    /// Record a completed call.
    pub fn record_request(duration: Duration) {
        counter!("write_back_requests_total").increment(1);
        histogram!("write_back_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed call.
    pub fn record_error() {
        counter!("write_back_errors_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_creation() {
        let recorder = PrometheusRecorder::new();
        assert!(recorder.handle().is_none());
        assert!(recorder.render().is_none());
    }

    #[test]
    fn test_recorder_install_and_render() {
        let mut recorder = PrometheusRecorder::new();
        recorder.install().unwrap();

        PublishMetrics::record_publish(Duration::from_millis(3));
        AggregationMetrics::record_consume();
        AggregationMetrics::record_applied();
        WriteBackMetrics::record_request(Duration::from_millis(12));

        // handle is None if another test installed the recorder first
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains("review_calculation_published_total"));
            assert!(rendered.contains("aggregation_applied_total"));
            assert!(rendered.contains("write_back_duration_seconds"));
        }
    }

    #[test]
    fn test_second_install_is_tolerated() {
        let mut first = PrometheusRecorder::new();
        let mut second = PrometheusRecorder::new();
        assert!(first.install().is_ok());
        assert!(second.install().is_ok());
        assert!(second.handle().is_none());
    }
}
