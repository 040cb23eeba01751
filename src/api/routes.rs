use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::handlers::{self, AppState};
use crate::store::traits::ResourceStore;

pub fn create_router<S: ResourceStore + 'static>(max_body_bytes: usize) -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Atomic operations
        .route("/operations", post(handlers::post_operations::<S>))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
}
