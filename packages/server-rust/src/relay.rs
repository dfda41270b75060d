//! Execution relay: the per-request path from HTTP body to HTTP response.
//!
//! Decode -> Execute -> Classify -> Log -> Respond, strictly in that order.
//! The only early exit is a body that does not decode, which is answered
//! with `400 Bad Request` and leaves no access record.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use brick_core::{AccessContext, ComposedSchema, ErrorTriage, ExecutionResult, QueryRequest};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use tracing::{debug, error, info_span, Instrument};

use crate::logging::TracingAccessSink;
use crate::network::DeploymentMode;
use crate::traits::{AccessSink, QueryEngine};

/// Body sent for requests that are not a decodable GraphQL envelope.
pub const BAD_REQUEST_BODY: &str = "Bad Request";

const JSON: &str = "application/json";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Response produced by [`ExecutionRelay::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl RelayResponse {
    fn bad_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            content_type: PLAIN_TEXT,
            body: Bytes::from_static(BAD_REQUEST_BODY.as_bytes()),
        }
    }

    fn json(status: StatusCode, body: Bytes) -> Self {
        Self {
            status,
            content_type: JSON,
            body,
        }
    }
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        (self.status, [(CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

/// Runs GraphQL requests against the composed schema and relays the result.
///
/// Holds only shared, immutable state, so one relay serves every request
/// concurrently.
pub struct ExecutionRelay {
    schema: ComposedSchema,
    engine: Arc<dyn QueryEngine>,
    access_sink: Arc<dyn AccessSink>,
    mode: DeploymentMode,
}

impl ExecutionRelay {
    /// Creates a relay that writes access records through `tracing`.
    #[must_use]
    pub fn new(schema: ComposedSchema, engine: Arc<dyn QueryEngine>, mode: DeploymentMode) -> Self {
        Self {
            schema,
            engine,
            access_sink: Arc::new(TracingAccessSink),
            mode,
        }
    }

    /// Replaces the access-log sink.
    #[must_use]
    pub fn with_access_sink(mut self, sink: Arc<dyn AccessSink>) -> Self {
        self.access_sink = sink;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &ComposedSchema {
        &self.schema
    }

    /// Handles one request body.
    ///
    /// Status is 500 when any error was a masked panic or an internal error,
    /// 200 otherwise, even when business errors are present.
    ///
    /// Every request increments `brick_graphql_requests_total`, labelled
    /// `outcome` = `ok`, `internal_error` or `bad_request`. The counter goes
    /// to whatever `metrics` recorder the embedding binary installs and is a
    /// no-op without one.
    ///
    /// # Panics
    ///
    /// Panics if the execution result cannot be serialized to JSON. The
    /// engine's output is always plain JSON data, so this is a bug rather
    /// than a request failure.
    pub async fn handle(&self, body: &[u8]) -> RelayResponse {
        let request: QueryRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejecting undecodable graphql request");
                metrics::counter!("brick_graphql_requests_total", "outcome" => "bad_request")
                    .increment(1);
                return RelayResponse::bad_request();
            }
        };

        let access = AccessContext::for_query(
            &request.query,
            &request.operation_name,
            self.mode.is_production(),
        );

        let span = info_span!(
            "graphql",
            operation = %request.operation_name,
            errors = tracing::field::Empty,
        );
        let mut result = self
            .engine
            .execute(&self.schema, request)
            .instrument(span.clone())
            .await;
        span.record("errors", result.errors.len());

        let triage = ErrorTriage::run(&mut result.errors);
        if let Some(line) = triage.log_line() {
            span.in_scope(|| error!(error = %line, "graphql execution failed"));
        }

        let body = encode_result(&result);
        let (status, outcome) = if triage.internal_failure() {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        } else {
            (StatusCode::OK, "ok")
        };
        metrics::counter!("brick_graphql_requests_total", "outcome" => outcome).increment(1);

        self.access_sink.record(&access, status);
        RelayResponse::json(status, body)
    }
}

fn encode_result(result: &ExecutionResult) -> Bytes {
    match serde_json::to_vec(result) {
        Ok(body) => Bytes::from(body),
        Err(e) => {
            error!(error = %e, "execution result is not serializable");
            panic!("execution result is not serializable: {e}");
        }
    }
}
