use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, indexing, integrations};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/integrations", get(integrations::panels))
        .route("/integrations/:provider/history", get(integrations::history))
        .route("/api/v1/:provider/revoke", post(integrations::revoke))
        .route("/api/v1/indexing/runs", get(indexing::list_runs))
        .route("/api/v1/indexing/runs/:run_id/items", get(indexing::run_items))
        .route(
            "/api/v1/indexing/items/:item_id/details",
            get(indexing::item_details),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
