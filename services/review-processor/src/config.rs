//! Configuration management for the review processor.
//!
//! Loads configuration from environment variables with sensible defaults.

use catalog_ratings_core::calculation::{REVIEW_CALCULATION_TOPIC, ZeroCountPolicy};
use catalog_ratings_runtime::RetryPolicy;
use catalog_ratings_runtime::config::{millis, parse, string};
use std::env;
use std::time::Duration;

pub use catalog_ratings_runtime::config::ConfigError;

/// Review processor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Host the health server binds to
    pub host: String,
    /// Port the health server binds to
    pub port: u16,
    /// Redis connection URL
    pub redis_url: String,
    /// Channel to consume calculation messages from
    pub calculation_topic: String,
    /// Base URL of the product service (write-back target)
    pub product_service_url: String,
    /// Timeout of one write-back call
    pub write_back_timeout: Duration,
    /// Backoff for failed write-backs
    pub retry_policy: RetryPolicy,
    /// Wait before resubscribing after the subscription ends
    pub reconnect_delay: Duration,
    /// What to do when the last review of a product is gone
    pub zero_count_policy: ZeroCountPolicy,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let retry_policy = RetryPolicy::builder()
            .max_retries(parse(&lookup, "WRITE_BACK_MAX_RETRIES", 3)?)
            .initial_delay(millis(&lookup, "WRITE_BACK_INITIAL_DELAY_MS", 100)?)
            .max_delay(millis(&lookup, "WRITE_BACK_MAX_DELAY_MS", 5000)?)
            .build();

        Ok(Self {
            host: string(&lookup, "HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 3001)?,
            redis_url: string(&lookup, "REDIS_URL", "redis://localhost:6379"),
            calculation_topic: string(&lookup, "CALCULATION_TOPIC", REVIEW_CALCULATION_TOPIC),
            product_service_url: string(&lookup, "PRODUCT_SERVICE_URL", "http://localhost:3000"),
            write_back_timeout: millis(&lookup, "WRITE_BACK_TIMEOUT_MS", 5000)?,
            retry_policy,
            reconnect_delay: millis(&lookup, "RECONNECT_DELAY_MS", 5000)?,
            zero_count_policy: parse(&lookup, "ZERO_COUNT_POLICY", ZeroCountPolicy::default())?,
        })
    }

    /// `host:port` to bind the health server to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
