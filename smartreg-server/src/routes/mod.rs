use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{health_handler, index_handler, submit_handler},
    infra::app_state::AppState,
};

pub const INDEX: &str = "/";
pub const HEALTH: &str = "/healthz";

/// Builds the application router with tracing.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(INDEX, get(index_handler).post(submit_handler))
        .route(HEALTH, get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
