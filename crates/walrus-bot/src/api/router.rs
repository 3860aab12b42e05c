//! API Router configuration

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/election/start", post(handlers::start_election))
        .route("/election/:server_id", get(handlers::election_status))
        .route("/gateway/message", post(handlers::gateway_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
