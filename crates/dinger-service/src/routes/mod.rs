//! HTTP routes for Dingaling.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::repositories::SubscriptionStore;
use crate::services::DeliveryChannel;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout for every route except the SSE listener.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Dinger and subscription persistence.
    pub store: Arc<dyn SubscriptionStore>,

    /// Per-client message delivery.
    pub channel: Arc<dyn DeliveryChannel>,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/ready` - Readiness probe (checks store + channel)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/d` - Create dinger
/// - `/d/:id`, `/d/:id/info`, `/d/:id/connect` - Dinger operations
/// - `/d/:id/listen` - SSE listener (no request timeout)
/// - TraceLayer for request logging
/// - HTTP metrics middleware
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/d", post(handlers::create_dinger))
        .route(
            "/d/:id",
            get(handlers::dinger_info).post(handlers::post_ding),
        )
        .route("/d/:id/info", get(handlers::dinger_info))
        .route(
            "/d/:id/connect",
            get(handlers::connect).post(handlers::connect),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state.clone());

    // Long-lived stream, kept out of the timeout layer
    let listen_routes = Router::new()
        .route("/d/:id/listen", get(handlers::listen))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TraceLayer - Log request details
    // 2. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .merge(listen_routes)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::DingerError;
    use crate::identifier;
    use crate::repositories::MemorySubscriptionStore;
    use crate::services::{MemoryDeliveryChannel, MessageStream, SessionIssuer};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use tower::ServiceExt;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    fn test_config() -> Config {
        let vars = HashMap::from([
            ("DATABASE_URL".to_string(), "postgresql://localhost/d".to_string()),
            ("REDIS_URL".to_string(), "redis://localhost".to_string()),
            (
                "PUBLIC_BASE_URL".to_string(),
                "http://ding.test".to_string(),
            ),
        ]);
        Config::from_vars(&vars).unwrap()
    }

    fn router_over(store: Arc<dyn SubscriptionStore>, channel: Arc<dyn DeliveryChannel>) -> Router {
        let state = Arc::new(AppState {
            store,
            channel,
            config: test_config(),
        });
        // Handle from an uninstalled recorder; rendering works without the global.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        build_routes(state, handle)
    }

    fn test_router() -> (Router, Arc<MemoryDeliveryChannel>) {
        let channel = Arc::new(MemoryDeliveryChannel::new());
        let app = router_over(Arc::new(MemorySubscriptionStore::new()), channel.clone());
        (app, channel)
    }

    /// Channel whose every send takes `delay` before reaching the inner channel.
    struct SlowChannel {
        inner: Arc<MemoryDeliveryChannel>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl DeliveryChannel for SlowChannel {
        async fn provision(&self, client_id: &str) -> Result<String, DingerError> {
            self.inner.provision(client_id).await
        }

        async fn send(&self, client_id: &str, message: &str) -> Result<(), DingerError> {
            tokio::time::sleep(self.delay).await;
            self.inner.send(client_id, message).await
        }

        async fn attach(&self, token: &str) -> Result<(String, MessageStream), DingerError> {
            self.inner.attach(token).await
        }

        async fn ping(&self) -> Result<(), DingerError> {
            self.inner.ping().await
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_info() {
        let (app, _) = test_router();

        let response = app
            .clone()
            .oneshot(
                Request::post("/d?name=Kitchen")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["name"], "Kitchen");
        assert_eq!(created["url"], format!("http://ding.test/d/{id}"));

        let response = app
            .oneshot(
                Request::get(format!("/d/{id}/info"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let info = json_body(response).await;
        assert_eq!(info["id"], id);
        assert_eq!(info["name"], "Kitchen");
    }

    #[tokio::test]
    async fn test_invalid_id_is_bad_request() {
        let (app, _) = test_router();

        let response = app
            .oneshot(Request::get("/d/xyz/info").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "INVALID_IDENTIFIER");
    }

    #[tokio::test]
    async fn test_non_utf8_body_is_bad_request() {
        let (app, _) = test_router();

        let response = app
            .oneshot(
                Request::post("/d/1")
                    .body(Body::from(vec![0xff, 0xfe, 0xfd]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_listen_streams_delivered_messages() {
        let (app, channel) = test_router();

        let created = json_body(
            app.clone()
                .oneshot(Request::post("/d").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let connected = json_body(
            app.clone()
                .oneshot(
                    Request::post(format!("/d/{id}/connect"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        let client_id = connected["id"].as_str().unwrap().to_string();
        let token = connected["token"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::get(format!("/d/{id}/listen?token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        channel.send(&client_id, "hello").await.unwrap();

        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        let data = frame.into_data().unwrap();
        assert!(String::from_utf8_lossy(&data).contains("data: hello"));
    }

    #[tokio::test]
    async fn test_listen_with_unknown_token_is_not_found() {
        let (app, _) = test_router();

        let response = app
            .oneshot(
                Request::get("/d/1/listen?token=nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_outlives_request_timeout() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let inner = Arc::new(MemoryDeliveryChannel::new());
        let slow = Arc::new(SlowChannel {
            inner: inner.clone(),
            delay: Duration::from_secs(20),
        });

        let dinger = store.create_dinger("Slow").await.unwrap();
        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(
                SessionIssuer::subscribe(store.as_ref(), slow.as_ref(), dinger.id)
                    .await
                    .unwrap(),
            );
        }

        let app = router_over(store.clone(), slow);
        let response = app
            .oneshot(
                Request::post(format!("/d/{}", identifier::encode(dinger.id)))
                    .body(Body::from("late"))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Three 20 s sends exceed the 30 s request timeout
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(inner.send_count() < 3);

        tokio::time::sleep(Duration::from_secs(60)).await;

        for client in &clients {
            assert_eq!(inner.delivered_to(&client.id).await, vec!["late"]);
        }
        assert_eq!(inner.send_count(), 3);
        assert_eq!(store.client_count(dinger.id).await, 3);
    }
}
