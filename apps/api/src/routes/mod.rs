pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::filter::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Filter API
        .route("/api/v1/filter/run", post(handlers::handle_run))
        .route("/api/v1/filter/review", post(handlers::handle_review))
        .route("/api/v1/filter/reset", post(handlers::handle_reset))
        .route("/api/v1/filter/stats", get(handlers::handle_stats))
        // Results
        .route("/api/v1/targets", get(handlers::handle_list_targets))
        .with_state(state)
}
