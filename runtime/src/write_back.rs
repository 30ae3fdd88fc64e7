//! HTTP client for `PUT /private/products/{id}`.

use crate::metrics::WriteBackMetrics;
use async_trait::async_trait;
use catalog_ratings_core::catalog::{Product, ProductId};
use catalog_ratings_core::write_back::{AverageRatingUpdate, WriteBack, WriteBackError};
use reqwest::StatusCode;
use std::time::{Duration, Instant};

/// Default bound on a single write-back call.
pub const DEFAULT_WRITE_BACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Write-back over HTTP to the product service.
#[derive(Debug, Clone)]
pub struct HttpWriteBack {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWriteBack {
    /// Create a client for the product service at `base_url`
    /// (e.g. `http://localhost:3000`).
    ///
    /// # Errors
    ///
    /// Returns [`WriteBackError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WriteBackError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WriteBackError::Transport(e.to_string()))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Use a preconfigured client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, product_id: ProductId) -> String {
        format!("{}/private/products/{product_id}", self.base_url)
    }

    async fn send(
        &self,
        product_id: ProductId,
        average_rating: f64,
    ) -> Result<Product, WriteBackError> {
        let response = self
            .client
            .put(self.url(product_id))
            .json(&AverageRatingUpdate { average_rating })
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Product>()
                .await
                .map_err(|e| WriteBackError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => WriteBackError::NotFound(product_id),
            s if s.is_server_error() => WriteBackError::Server {
                status: s.as_u16(),
                body,
            },
            s => WriteBackError::Rejected {
                status: s.as_u16(),
                body,
            },
        })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> WriteBackError {
    if error.is_timeout() {
        WriteBackError::Timeout
    } else {
        WriteBackError::Transport(error.to_string())
    }
}

#[async_trait]
impl WriteBack for HttpWriteBack {
    async fn write_back(
        &self,
        product_id: ProductId,
        average_rating: f64,
    ) -> Result<Product, WriteBackError> {
        let start = Instant::now();
        let result = self.send(product_id, average_rating).await;
        WriteBackMetrics::record_request(start.elapsed());

        if let Err(e) = &result {
            WriteBackMetrics::record_error();
            tracing::warn!(product_id = %product_id, error = %e, "Write-back call failed");
        }
        result
    }
}
