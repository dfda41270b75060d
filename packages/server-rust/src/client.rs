//! Outbound GraphQL client.
//!
//! Talks to another gateway (or any GraphQL-over-HTTP endpoint) and turns
//! its error envelope back into typed errors: an encoded business error in
//! the first error message becomes [`FetchError::Business`].

use brick_core::{BusinessError, GraphqlError, QueryRequest};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Errors returned by [`GraphqlClient::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http status error: {0}")]
    Status(u16),
    #[error(transparent)]
    Business(BusinessError),
    #[error("{0}")]
    Remote(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

/// Client for one GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
    debug: bool,
}

impl GraphqlClient {
    /// Creates a client for `url`.
    ///
    /// Request and response bodies are logged at `debug` level when the
    /// `DEBUG` environment variable is `true`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), url)
    }

    /// Creates a client reusing an existing `reqwest` connection pool.
    #[must_use]
    pub fn with_http_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            headers: HeaderMap::new(),
            debug: std::env::var("DEBUG").is_ok_and(|v| v == "true"),
        }
    }

    /// Adds a header sent with every request (e.g., `Authorization`).
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Posts `request` and decodes the whole response body into `T`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Status`] for a non-2xx status
    /// - [`FetchError::Business`] when the first error is an encoded business error
    /// - [`FetchError::Remote`] for any other first error message
    /// - [`FetchError::Transport`] / [`FetchError::Decode`] for I/O and JSON failures
    pub async fn fetch<T: DeserializeOwned>(&self, request: &QueryRequest) -> Result<T, FetchError> {
        if self.debug {
            let body = serde_json::to_string(request)?;
            debug!(url = %self.url, body = %body, "graphql fetch");
        }

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        if self.debug {
            debug!(url = %self.url, body = %String::from_utf8_lossy(&body), "graphql response");
        }

        let envelope: ErrorEnvelope = serde_json::from_slice(&body)?;
        if let Some(first) = envelope.errors.into_iter().next() {
            return Err(match BusinessError::parse(&first.message) {
                Some(business) => FetchError::Business(business),
                None => FetchError::Remote(first.message),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{DeploymentMode, GatewayConfig, GatewayModule};
    use crate::relay::tests::StubEngine;
    use crate::relay::ExecutionRelay;
    use axum::routing::post;
    use axum::{Json, Router};
    use brick_core::{ComposedSchema, ExecutionResult, PANIC_MARKER};
    use http::header::AUTHORIZATION;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    #[derive(Debug, Deserialize)]
    struct TestData {
        data: TestQuery,
    }

    #[derive(Debug, Deserialize)]
    struct TestQuery {
        test: TestItem,
    }

    #[derive(Debug, Deserialize)]
    struct TestItem {
        id: String,
    }

    async fn spawn(router: Router) -> (String, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        (format!("http://{addr}/graphql"), tx)
    }

    async fn spawn_gateway(result: ExecutionResult) -> (String, oneshot::Sender<()>) {
        let relay = ExecutionRelay::new(
            ComposedSchema::new("type Query {\ntest(one:Int,two:String):Test\n}"),
            StubEngine::new(result),
            DeploymentMode::Development,
        );
        let router = GatewayModule::new(GatewayConfig::default(), relay).build_router();
        spawn(router).await
    }

    fn query() -> QueryRequest {
        QueryRequest::new("query ($one: Int, $two: String) { test(one: $one, two: $two) { id } }")
    }

    #[tokio::test]
    async fn fetch_decodes_data() {
        let (url, _stop) = spawn_gateway(ExecutionResult::data(json!({ "test": { "id": "123" } }))).await;

        let client = GraphqlClient::new(url)
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer 123"));
        let result: TestData = client.fetch(&query()).await.unwrap();

        assert_eq!(result.data.test.id, "123");
    }

    #[tokio::test]
    async fn fetch_surfaces_business_error() {
        let result = ExecutionResult::default()
            .with_error(GraphqlError::new(BusinessError::new(100, "test error").to_string()));
        let (url, _stop) = spawn_gateway(result).await;

        let err = GraphqlClient::new(url)
            .fetch::<Value>(&query())
            .await
            .unwrap_err();

        match err {
            FetchError::Business(business) => {
                assert_eq!(business, BusinessError::new(100, "test error"));
            }
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_reports_http_status() {
        let result = ExecutionResult::default().with_error(GraphqlError::new(PANIC_MARKER));
        let (url, _stop) = spawn_gateway(result).await;

        let err = GraphqlClient::new(url)
            .fetch::<Value>(&query())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status(500)));
        assert_eq!(err.to_string(), "http status error: 500");
    }

    #[tokio::test]
    async fn fetch_reports_remote_error_message() {
        let router = Router::new().route(
            "/graphql",
            post(|| async { Json(json!({ "errors": [{ "message": "not allowed" }] })) }),
        );
        let (url, _stop) = spawn(router).await;

        let err = GraphqlClient::new(url)
            .fetch::<Value>(&query())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Remote(ref m) if m == "not allowed"));
    }

    #[tokio::test]
    async fn fetch_sends_operation_and_variables() {
        let router = Router::new().route(
            "/graphql",
            post(|Json(body): Json<Value>| async move { Json(json!({ "data": body })) }),
        );
        let (url, _stop) = spawn(router).await;

        let mut variables = serde_json::Map::new();
        variables.insert("one".to_string(), json!(1));
        let request = query().with_operation("Test").with_variables(variables);
        let echoed: Value = GraphqlClient::new(url).fetch(&request).await.unwrap();

        assert_eq!(echoed["data"]["operationName"], "Test");
        assert_eq!(echoed["data"]["variables"]["one"], 1);
        assert_eq!(echoed["data"]["query"], request.query);
    }
}
