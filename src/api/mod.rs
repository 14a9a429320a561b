//! REST + WebSocket API using Axum
//!
//! Serves the digital-twin dashboard: halt status, unit list, on-demand
//! orchestration, failure injection and resume, chat, and the per-unit live
//! telemetry WebSocket.

pub mod envelope;
pub mod handlers;
mod routes;
pub mod ws;

pub use handlers::DashboardState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `GANTRY_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development (e.g., `http://localhost:5173` for the Vite dev server).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var("GANTRY_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: DashboardState) -> Router {
    Router::new()
        .merge(routes::api_routes(state.clone()).layer(CompressionLayer::new()))
        .merge(routes::feed_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
