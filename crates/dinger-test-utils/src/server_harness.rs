//! Test server harness for E2E testing
//!
//! Provides `TestDingerServer` for spawning real Dingaling server instances
//! backed by the in-memory subscription store and delivery channel.

use dinger_service::config::Config;
use dinger_service::observability::metrics::init_metrics_recorder;
use dinger_service::repositories::MemorySubscriptionStore;
use dinger_service::routes::{self, AppState};
use dinger_service::services::MemoryDeliveryChannel;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the Dingaling server in E2E tests.
///
/// The store and channel handles are shared with the running server, so
/// tests can inspect subscriptions and inject failures.
pub struct TestDingerServer {
    addr: SocketAddr,
    config: Config,
    store: Arc<MemorySubscriptionStore>,
    channel: Arc<MemoryDeliveryChannel>,
    _handle: JoinHandle<()>,
}

impl TestDingerServer {
    /// Spawn a server with a fresh in-memory store and channel.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(
            Arc::new(MemorySubscriptionStore::new()),
            Arc::new(MemoryDeliveryChannel::new()),
        )
        .await
    }

    /// Spawn a server over the given store and channel.
    ///
    /// The server binds to a random available port (127.0.0.1:0) and runs
    /// in a background task until the harness is dropped.
    pub async fn spawn_with(
        store: Arc<MemorySubscriptionStore>,
        channel: Arc<MemoryDeliveryChannel>,
    ) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("REDIS_URL".to_string(), "redis://test".to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState {
            store: store.clone(),
            channel: channel.clone(),
            config: config.clone(),
        });

        // The global recorder can only be installed once per process
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => PrometheusBuilder::new().build_recorder().handle(),
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            store,
            channel,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the subscription store shared with the server.
    pub fn store(&self) -> &Arc<MemorySubscriptionStore> {
        &self.store
    }

    /// Get the delivery channel shared with the server.
    pub fn channel(&self) -> &Arc<MemoryDeliveryChannel> {
        &self.channel
    }
}

impl Drop for TestDingerServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
