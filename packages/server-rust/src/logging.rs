//! Tracing subscriber setup and the default access-log sink.

use brick_core::AccessContext;
use http::StatusCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::network::DeploymentMode;
use crate::traits::AccessSink;

/// Target used for access-log events, so they can be filtered separately.
pub const ACCESS_TARGET: &str = "access";

/// Installs the global tracing subscriber.
///
/// Production emits one JSON object per event; other modes use the compact
/// human-readable format. The filter comes from `RUST_LOG`, defaulting to
/// `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(mode: DeploymentMode) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if mode.is_production() {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Writes each access record as one `info` event on the `access` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessSink;

impl AccessSink for TracingAccessSink {
    fn record(&self, access: &AccessContext, status: StatusCode) {
        let fields = access
            .iter()
            .map(|(k, v)| format!("{k}={v:?}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            target: ACCESS_TARGET,
            status = status.as_u16(),
            schema = access.get(brick_core::access::SCHEMA_KEY),
            schema_hash = access.get(brick_core::access::SCHEMA_HASH_KEY),
            operation = access.get(brick_core::access::OPERATION_KEY),
            fields = %fields,
            "graphql request"
        );
    }
}
