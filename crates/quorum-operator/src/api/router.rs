//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the diagnostics router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/clusters", get(handlers::list_clusters))
        .route("/clusters/:namespace/:name", get(handlers::get_cluster));

    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if state.ctx.config().server.enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
