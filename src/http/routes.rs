use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Turn control
        .route("/conversation/turn/start", post(handlers::start_turn))
        .route("/conversation/turn/stop", post(handlers::stop_turn))
        .route("/conversation/stop", post(handlers::stop_conversation))
        // Conversation queries
        .route("/conversation/status", get(handlers::get_status))
        .route("/conversation/history", get(handlers::get_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
