//! Networking: configuration, HTTP handlers, middleware, and the gateway
//! lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod lifecycle;

pub use config::*;
pub use handlers::AppState;
pub use lifecycle::{GatewayState, Lifecycle, RequestGuard};
pub use module::GatewayModule;
