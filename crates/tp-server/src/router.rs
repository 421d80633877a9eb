//! Axum router construction.

use axum::middleware;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::error::panic_response;
use crate::middleware::rate_limit::{create_limiter, rate_limit_middleware};
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let mut download_routes: Router<AppContext> =
        Router::new().route("/stream-mp3", get(routes::stream::stream_mp3));

    if let Some(limiter) = create_limiter(ctx.config.server.rate_limit_per_minute) {
        download_routes = download_routes
            .route_layer(middleware::from_fn(rate_limit_middleware))
            .route_layer(Extension(limiter));
    }

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(download_routes)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
