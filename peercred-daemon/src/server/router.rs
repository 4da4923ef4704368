use axum::routing::post;
use axum::Router;
use peercred_common::QUERY_PATH;

use crate::server::api::v1_query;
use crate::state::AppState;

/// Routes of the HTTPS listener
pub fn build(state: AppState) -> Router {
    Router::new()
        .route(QUERY_PATH, post(v1_query))
        .with_state(state)
}
