//! Configuration management for the product service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unset variables fall back to their default; set but malformed variables
//! are an error.

use catalog_ratings_core::calculation::REVIEW_CALCULATION_TOPIC;
use catalog_ratings_runtime::config::{flag, millis, parse, string};
use std::env;
use std::time::Duration;

pub use catalog_ratings_runtime::config::ConfigError;

/// Product service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Redis connection URL
    pub redis_url: String,
    /// Channel calculation messages are published on
    pub calculation_topic: String,
    /// Serve `/metrics` and install the Prometheus recorder
    pub metrics_enabled: bool,
    /// Bound on one publish; a slower channel counts as a failed publish
    pub publish_timeout: Duration,
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
        Ok(Self {
            host: string(&lookup, "HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 3000)?,
            redis_url: string(&lookup, "REDIS_URL", "redis://localhost:6379"),
            calculation_topic: string(&lookup, "CALCULATION_TOPIC", REVIEW_CALCULATION_TOPIC),
            metrics_enabled: flag(&lookup, "METRICS_ENABLED", true)?,
            publish_timeout: millis(&lookup, "PUBLISH_TIMEOUT_MS", 2000)?,
        })
    }

    /// `host:port` to bind the listener to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
