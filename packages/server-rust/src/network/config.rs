//! Gateway configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Deployment mode, taken from the `ENV` variable.
///
/// Only the exact value `production` selects [`DeploymentMode::Production`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentMode {
    #[default]
    Development,
    Production,
}

impl DeploymentMode {
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "production" {
            Self::Production
        } else {
            Self::Development
        })
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Route the GraphQL endpoint is mounted on.
    pub graphql_path: String,
    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
    /// Maximum accepted request body size in bytes.
    pub body_limit: usize,
    /// Selects production-only behavior (query fingerprints, JSON logs).
    pub mode: DeploymentMode,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            graphql_path: "/graphql".to_string(),
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            body_limit: 2 * 1024 * 1024,
            mode: DeploymentMode::Development,
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file.
    pub cert_path: PathBuf,
    /// Path to the TLS private key file.
    pub key_path: PathBuf,
}

/// Command-line and environment settings for a gateway process.
#[derive(Debug, Clone, clap::Parser)]
#[command(about = "GraphQL gateway")]
pub struct GatewayArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "PORT", default_value_t = 0)]
    pub port: u16,
    #[arg(long, env = "GRAPHQL_PATH", default_value = "/graphql")]
    pub graphql_path: String,
    /// Deployment mode; `production` enables query fingerprints.
    #[arg(long = "env", env = "ENV", default_value = "development")]
    pub mode: DeploymentMode,
    #[arg(long = "cors-origin", env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
    #[arg(long, env = "TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    #[arg(long, env = "TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
}

impl From<GatewayArgs> for GatewayConfig {
    fn from(args: GatewayArgs) -> Self {
        let tls = match (args.tls_cert, args.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            _ => None,
        };
        Self {
            host: args.host,
            port: args.port,
            graphql_path: args.graphql_path,
            tls,
            cors_origins: args.cors_origins,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            mode: args.mode,
            ..Self::default()
        }
    }
}
