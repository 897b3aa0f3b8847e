use crate::engine::Engine;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;

pub mod handlers;
pub mod responses;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/health", get(handlers::get_health))
        .route("/api/stats", get(handlers::get_stats))
        .with_state(engine)
}
