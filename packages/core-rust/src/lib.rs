//! Brick Core — schema composition, business error encoding, and execution
//! error triage for the GraphQL gateway.

pub mod access;
pub mod business;
pub mod classify;
pub mod execution;
pub mod schema;

pub use access::{normalize_query, query_fingerprint, AccessContext};
pub use business::BusinessError;
pub use classify::{ClassifiedError, ErrorTriage, MASKED_PANIC_MESSAGE, PANIC_MARKER};
pub use execution::{ExecutionResult, GraphqlError, Location, QueryRequest};
pub use schema::{ComposedSchema, SchemaComposer, SchemaDocument, SchemaError};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
