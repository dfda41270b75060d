//! HTTP layers for the gateway router.
//!
//! The GraphQL route gets its own body cap; everything else is applied to
//! the whole router, outermost first:
//!
//! 1. sensitive headers (`Authorization`, `Cookie`) hidden from logs
//! 2. `X-Request-Id` assigned when the caller sent none
//! 3. one `http` span per request carrying method, path and request id
//! 4. gzip
//! 5. CORS for the GraphQL `POST` and the `GET` probes
//! 6. `408` after `request_timeout`
//! 7. request id echoed on the response

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info_span, Span};

use super::config::GatewayConfig;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn request_id_header() -> HeaderName {
    HeaderName::from_static(REQUEST_ID_HEADER)
}

/// Replaces axum's default body cap on `routes` with `config.body_limit`;
/// larger bodies get `413`.
pub fn limit_body<S>(routes: Router<S>, config: &GatewayConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .route_layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.body_limit))
}

/// Wraps the finished router in the gateway-wide layers.
pub fn with_http_layers(router: Router, config: &GatewayConfig) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION, COOKIE]))
            .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(http_span))
            .layer(CompressionLayer::new())
            .layer(cors(&config.cors_origins))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                config.request_timeout,
            ))
            .layer(PropagateRequestIdLayer::new(request_id_header())),
    )
}

fn http_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    info_span!(
        "http",
        method = %request.method(),
        path = request.uri().path(),
        request_id,
    )
}

/// A `"*"` entry allows any origin; otherwise only the parseable listed ones.
fn cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .expose_headers([request_id_header()])
}
