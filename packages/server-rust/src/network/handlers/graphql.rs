//! GraphQL endpoint handler.

use axum::extract::State;
use axum::response::IntoResponse;
use bytes::Bytes;

use super::AppState;

/// Handles POST requests carrying a JSON GraphQL envelope.
///
/// The body is taken raw so that undecodable JSON reaches the relay, which
/// answers it with a plain-text `400 Bad Request`.
pub async fn graphql_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let _guard = state.lifecycle.track_request();
    state.relay.handle(&body).await
}
