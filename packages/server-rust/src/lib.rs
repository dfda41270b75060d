//! Brick Server — axum GraphQL gateway: feature registration, execution
//! relay, and an outbound GraphQL client.

pub mod client;
pub mod logging;
pub mod network;
pub mod registry;
pub mod relay;
pub mod traits;

pub use client::{FetchError, GraphqlClient};
pub use network::{DeploymentMode, GatewayArgs, GatewayConfig, GatewayModule};
pub use registry::{FeatureModule, FeatureRegistry, RegistryError};
pub use relay::{ExecutionRelay, RelayResponse};
pub use traits::{AccessSink, QueryEngine};
