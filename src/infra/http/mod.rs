pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tracing::warn;

/// Shorten/Expand are pure CPU work with no cancellation point, so cap
/// their input well below the general image limit.
const TEXT_BODY_LIMIT: usize = 1024 * 1024;
/// Rendered PNGs submitted to Extract can be large.
const IMAGE_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Public API served on the main listener.
pub fn build_api_router(state: ApiState) -> Router {
    let text_routes = Router::new()
        .route("/api/v1/shorten", post(handlers::shorten))
        .route("/api/v1/expand", post(handlers::expand))
        .route_layer(DefaultBodyLimit::max(TEXT_BODY_LIMIT));

    Router::new()
        .route("/api/v1/render", post(handlers::render))
        .route("/api/v1/extract", post(handlers::extract))
        .merge(text_routes)
        .route("/healthz", get(handlers::healthz))
        .layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT))
        .layer(middleware::from_fn(log_responses))
        .with_state(state)
}

/// Internal router served on the cache listener; peers fetch owned keys
/// here and never through the public API.
pub fn build_cache_router(state: ApiState) -> Router {
    Router::new()
        .route("/internal/cache/render/{key}", get(handlers::cache_fill))
        .layer(middleware::from_fn(log_responses))
        .with_state(state)
}

async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        warn!(
            target = "umlpipe::http",
            %method,
            %uri,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request failed"
        );
    }
    response
}
