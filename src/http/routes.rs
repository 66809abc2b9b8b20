use super::handlers;
use super::state::AppState;
use axum::{
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Monitoring control
        .route(
            "/groups/:group_id/monitoring",
            get(handlers::get_monitoring_status)
                .post(handlers::start_monitoring)
                .delete(handlers::stop_monitoring),
        )
        // Threshold configuration
        .route(
            "/groups/:group_id/threshold",
            get(handlers::get_threshold).put(handlers::set_threshold),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
