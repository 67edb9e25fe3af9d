pub mod routes;

use crate::state::DensityServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router
pub fn router(state: DensityServiceState) -> Router {
    let max_upload_bytes = state.config().max_upload_bytes;
    let max_concurrent_requests = state.config().max_concurrent_requests;

    Router::new()
        .route("/", get(routes::service_info))
        .route("/metrics", get(routes::metrics))
        .route("/api/health", get(routes::health))
        // concurrency cap covers detection only
        .route(
            "/api/detect",
            post(routes::detect).layer(ConcurrencyLimitLayer::new(max_concurrent_requests)),
        )
        .route("/api/alert", post(routes::test_alert))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
