//! HTTP metrics middleware.
//!
//! Applied as the outermost layer so responses produced by the framework
//! itself (404 for unknown routes, 405, extractor rejections) and by the
//! timeout layer are counted along with handler responses.

use crate::observability::metrics::record_http_request;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Record method, normalized path, status and duration of every request.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "OK"
    }

    async fn unavailable_handler() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "down")
    }

    fn test_app() -> Router {
        Router::new()
            .route("/d/:id/info", get(ok_handler))
            .route("/d/:id", post(unavailable_handler))
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        test_app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_middleware_passes_responses_through() {
        assert_eq!(status_of("GET", "/d/2a/info").await, StatusCode::OK);
        assert_eq!(
            status_of("POST", "/d/2a").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_middleware_sees_framework_responses() {
        assert_eq!(status_of("GET", "/nowhere").await, StatusCode::NOT_FOUND);
        assert_eq!(
            status_of("DELETE", "/d/2a").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
