//! Gateway module with deferred startup lifecycle.
//!
//! `new()` takes the finished relay, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. Schema composition must be
//! complete before `new()`: the relay only ever sees the frozen document.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{GatewayConfig, TlsConfig};
use super::handlers::{
    graphql_handler, health_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::{limit_body, with_http_layers};
use super::lifecycle::Lifecycle;
use crate::relay::ExecutionRelay;

/// How long `serve()` waits for in-flight requests after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages the HTTP server lifecycle of the gateway.
///
/// 1. `new()` -- wraps the relay and allocates the lifecycle
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct GatewayModule {
    config: GatewayConfig,
    listener: Option<TcpListener>,
    relay: Arc<ExecutionRelay>,
    lifecycle: Arc<Lifecycle>,
}

impl GatewayModule {
    /// Creates a gateway module without binding any port.
    #[must_use]
    pub fn new(config: GatewayConfig, relay: ExecutionRelay) -> Self {
        Self {
            config,
            listener: None,
            relay: Arc::new(relay),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Returns the lifecycle shared with the router, for probes and tests.
    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `POST {graphql_path}` -- GraphQL execution relay
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    pub fn build_router(&self) -> Router {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            lifecycle: Arc::clone(&self.lifecycle),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        let graphql = limit_body(
            Router::new().route(&self.config.graphql_path, post(graphql_handler)),
            &self.config,
        );
        let router = Router::new()
            .merge(graphql)
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .with_state(state);

        with_http_layers(router, &self.config)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound port, which differs from the configured one when
    /// port 0 asks the OS for an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(
            "TCP listener bound to {}:{} (graphql at {}, mode {})",
            self.config.host, port, self.config.graphql_path, self.config.mode
        );

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until the shutdown future resolves, then drains
    /// in-flight requests for up to 30 seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, if TLS material
    /// cannot be loaded, or if the server hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let lifecycle = self.lifecycle;

        lifecycle.mark_serving();

        if let Some(ref tls_config) = self.config.tls {
            serve_tls(listener, router, tls_config, shutdown).await?;
        } else {
            info!("Serving plain HTTP connections");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }

        drain(&lifecycle).await;
        Ok(())
    }
}

/// Serves TLS connections using `axum-server` with rustls, reusing the
/// pre-bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS connections on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn drain(lifecycle: &Lifecycle) {
    lifecycle.begin_drain();

    if lifecycle.drained(DRAIN_TIMEOUT).await {
        info!("All relayed requests finished");
    } else {
        warn!(
            active = lifecycle.active_requests(),
            "Drain timeout expired with GraphQL requests still running"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{DeploymentMode, GatewayState};
    use crate::relay::tests::StubEngine;
    use axum::body::{to_bytes, Body};
    use brick_core::{ComposedSchema, ExecutionResult, GraphqlError};
    use http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn module(result: ExecutionResult, config: GatewayConfig) -> GatewayModule {
        let relay = ExecutionRelay::new(
            ComposedSchema::new("type Query {\nme:User\n}"),
            StubEngine::new(result),
            DeploymentMode::Development,
        );
        GatewayModule::new(config, relay)
    }

    fn graphql_post(path: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module(ExecutionResult::default(), GatewayConfig::default());
        assert!(module.listener.is_none());
        assert_eq!(module.lifecycle().state(), GatewayState::Starting);
    }

    #[tokio::test]
    async fn router_relays_graphql_requests() {
        let router = module(
            ExecutionResult::data(json!({ "me": null })),
            GatewayConfig::default(),
        )
        .build_router();

        let response = router
            .oneshot(graphql_post("/graphql", r#"{"query":"{ me }"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"data":{"me":null}}"#);
    }

    #[tokio::test]
    async fn router_answers_malformed_body_with_400() {
        let router = module(ExecutionResult::default(), GatewayConfig::default()).build_router();

        let response = router
            .oneshot(graphql_post("/graphql", "{"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Bad Request");
    }

    #[tokio::test]
    async fn router_returns_500_for_masked_panic() {
        let result = ExecutionResult::default()
            .with_error(GraphqlError::new("graphql: panic occurred: boom"));
        let router = module(result, GatewayConfig::default()).build_router();

        let response = router
            .oneshot(graphql_post("/graphql", r#"{"query":"{ me }"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"errors":[{"message":"masked panic"}]}"#);
    }

    #[tokio::test]
    async fn router_mounts_graphql_on_configured_path() {
        let config = GatewayConfig {
            graphql_path: "/api".to_string(),
            ..GatewayConfig::default()
        };
        let router = module(ExecutionResult::data(json!({})), config).build_router();

        let moved = router
            .clone()
            .oneshot(graphql_post("/graphql", r#"{"query":"{ me }"}"#))
            .await
            .unwrap();
        assert_eq!(moved.status(), StatusCode::NOT_FOUND);

        let api = router
            .oneshot(graphql_post("/api", r#"{"query":"{ me }"}"#))
            .await
            .unwrap();
        assert_eq!(api.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn router_rejects_oversized_body() {
        let config = GatewayConfig {
            body_limit: 8,
            ..GatewayConfig::default()
        };
        let router = module(ExecutionResult::default(), config).build_router();

        let response = router
            .oneshot(graphql_post("/graphql", r#"{"query":"{ me { id name } }"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module(
            ExecutionResult::default(),
            GatewayConfig {
                host: "127.0.0.1".to_string(),
                ..GatewayConfig::default()
            },
        );
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = module(ExecutionResult::default(), GatewayConfig::default());
        let err = module.serve(std::future::ready(())).await.unwrap_err();
        assert!(err.to_string().contains("start() must be called before serve()"));
    }

    #[tokio::test]
    async fn serve_drains_and_stops_after_shutdown() {
        let mut module = module(
            ExecutionResult::default(),
            GatewayConfig {
                host: "127.0.0.1".to_string(),
                ..GatewayConfig::default()
            },
        );
        module.start().await.unwrap();
        let lifecycle = module.lifecycle();

        module.serve(std::future::ready(())).await.unwrap();

        assert_eq!(lifecycle.state(), GatewayState::Stopped);
    }
}
