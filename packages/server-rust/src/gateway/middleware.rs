//! HTTP middleware for the gateway router.
//!
//! The request id is assigned before anything else sees the request and is
//! copied back onto every response, timeouts included.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::GatewayConfig;
use crate::lifecycle::Lifecycle;

fn request_id() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

/// Wraps `router` in the transport layers, outermost last:
/// request id, tracing, compression, CORS, request timeout (504).
pub fn with_http_layers(router: Router, config: &GatewayConfig) -> Router {
    router
        .layer(PropagateRequestIdLayer::new(request_id()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            config.request_timeout,
        ))
        .layer(cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id(), MakeRequestUuid))
}

/// `"*"` anywhere in `origins` allows every origin; unparsable entries are
/// skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Counts each request as in flight for graceful drain.
pub async fn track_in_flight(
    State(lifecycle): State<Arc<Lifecycle>>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = lifecycle.in_flight_guard();
    next.run(request).await
}
