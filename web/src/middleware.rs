//! Correlation-id middleware.
//!
//! Every request gets an `X-Correlation-ID`. A valid UUID sent by the client
//! is kept; anything else is replaced by a fresh v4 UUID. The id is stored in
//! the request extensions as a [`CorrelationId`], attached to the request
//! span, echoed on the response, and forwarded by the review handlers into
//! the metadata of every calculation message they publish.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/products", get(list_products))
//!     .layer(axum::middleware::from_fn(correlation_id));
//! ```

use crate::extractors::CorrelationId;
use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Read the correlation id a client sent, if it is a UUID.
pub(crate) fn from_headers(headers: &axum::http::HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Attach a correlation id to the request and its response.
pub async fn correlation_id(mut req: Request, next: Next) -> Response {
    let id = from_headers(req.headers()).unwrap_or_else(Uuid::new_v4);
    req.extensions_mut().insert(CorrelationId(id));

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %id,
        method = %req.method(),
        uri = %req.uri(),
    );

    let started = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::debug!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis(),
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|CorrelationId(id): CorrelationId| async move { id.to_string() }),
            )
            .layer(axum::middleware::from_fn(correlation_id))
    }

    async fn send(header: Option<&str>) -> (String, String) {
        let mut builder = Request::builder().uri("/echo");
        if let Some(value) = header {
            builder = builder.header(CORRELATION_ID_HEADER, value);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let echoed = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("correlation id header")
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (echoed, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn generates_an_id_when_missing() {
        let (header, body) = send(None).await;
        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(header, body);
    }

    #[tokio::test]
    async fn keeps_the_client_id() {
        let id = Uuid::new_v4().to_string();
        let (header, body) = send(Some(&id)).await;
        assert_eq!(header, id);
        assert_eq!(body, id);
    }

    #[tokio::test]
    async fn replaces_an_invalid_id() {
        let (header, _) = send(Some("not-a-uuid")).await;
        assert_ne!(header, "not-a-uuid");
        assert!(Uuid::parse_str(&header).is_ok());
    }
}
