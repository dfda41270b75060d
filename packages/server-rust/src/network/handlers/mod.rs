//! HTTP handler definitions for the gateway.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod graphql;
pub mod health;

pub use graphql::graphql_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{GatewayConfig, Lifecycle};
use crate::relay::ExecutionRelay;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Relay executing GraphQL requests against the composed schema.
    pub relay: Arc<ExecutionRelay>,
    /// Serving state and the count of requests still being relayed.
    pub lifecycle: Arc<Lifecycle>,
    /// Gateway configuration (bind address, TLS, mode).
    pub config: Arc<GatewayConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
