use async_trait::async_trait;
use brick_core::{AccessContext, ComposedSchema, ExecutionResult, QueryRequest};
use http::StatusCode;

/// The embedded GraphQL execution engine.
/// Parsing, validation, and resolver dispatch all live behind this trait.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Execute one request against the composed schema.
    ///
    /// Must be safe to call concurrently. Failures are reported in the
    /// result's `errors`, never as a Rust error.
    async fn execute(&self, schema: &ComposedSchema, request: QueryRequest) -> ExecutionResult;
}

/// Destination for per-request access records.
/// Fire-and-forget: implementations must not block the request.
pub trait AccessSink: Send + Sync {
    /// Record one completed request with its final status.
    fn record(&self, access: &AccessContext, status: StatusCode);
}
