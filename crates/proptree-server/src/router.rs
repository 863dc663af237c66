use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::handler;
use crate::state::AppState;

/// Build the axum router with all proptree endpoints.
pub fn build_router(state: AppState) -> Router {
    let operations = Router::new()
        .route("/v1/get", post(handler::get_handler))
        .route("/v1/put", post(handler::put_handler))
        .route("/v1/rm", post(handler::rm_handler))
        .route("/v1/mv", post(handler::mv_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .merge(operations)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
