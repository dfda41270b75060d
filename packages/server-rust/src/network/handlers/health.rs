//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns detailed health information as JSON.
///
/// Always returns 200; the `state` field tells whether the gateway is
/// actually serving, starting, or draining.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.lifecycle.state().as_str(),
        "mode": state.config.mode.as_str(),
        "in_flight": state.lifecycle.active_requests(),
        "schema_bytes": state.relay.schema().as_str().len(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- returns 200 when ready, 503 otherwise.
///
/// Not ready before `serve()` starts accepting, and again once shutdown
/// starts draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.lifecycle.state().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{DeploymentMode, GatewayConfig, Lifecycle};
    use crate::relay::tests::StubEngine;
    use crate::relay::ExecutionRelay;
    use brick_core::{ComposedSchema, ExecutionResult};
    use std::sync::Arc;
    use std::time::Instant;

    fn test_state() -> AppState {
        let relay = ExecutionRelay::new(
            ComposedSchema::new("type Query {\na:A\n}"),
            StubEngine::new(ExecutionResult::default()),
            DeploymentMode::Development,
        );
        AppState {
            relay: Arc::new(relay),
            lifecycle: Arc::new(Lifecycle::new()),
            config: Arc::new(GatewayConfig::default()),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state();
        state.lifecycle.mark_serving();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "serving");
        assert_eq!(json["mode"], "development");
        assert_eq!(json["in_flight"], 0);
        assert_eq!(json["schema_bytes"], 18);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_draining_state() {
        let state = test_state();
        state.lifecycle.mark_serving();
        state.lifecycle.begin_drain();

        let response = health_handler(State(state)).await;
        assert_eq!(response.0["state"], "draining");
    }

    #[tokio::test]
    async fn health_handler_reports_in_flight_count() {
        let state = test_state();
        let _guard = state.lifecycle.track_request();

        let response = health_handler(State(state)).await;
        assert_eq!(response.0["in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.lifecycle.mark_serving();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.lifecycle.begin_drain();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
